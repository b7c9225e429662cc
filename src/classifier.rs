//! Adaptive character classifier.
//!
//! Glyphs are matched against two template sets: the static pre-trained
//! templates in the character-normalized frame, and the per-document adapted
//! templates in the baseline frame. The adapted set grows from confidently
//! recognized words; configurations start temporary and become permanent
//! once they have been seen often enough.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::blob::{Blob, RowContext};
use crate::dict::{Dictionary, Permuter};
use crate::error::EngineError;
use crate::features::{BlobFeatures, FeatureExtractor, OutlineFeatureExtractor, PicoFeature};
use crate::geometry::{BlnTransform, BLN_X_HEIGHT};
use crate::matcher::{char_norm_adjustment, IntResult, IntegerMatcher};
use crate::persistence;
use crate::pruner::ClassPruner;
use crate::results::{add_large_speckle_to, BlobChoice, MatchResult, WORST_POSSIBLE_RATING};
use crate::templates::{
    AdaptedTemplates, BitVector, ConfigId, ConfigState, IntTemplates, Prototype, TempConfig, TempProto,
};
use crate::types::{ClassifierConfig, MatcherConfig};
use crate::unicharset::{self, ClassId, UnicharSet};
use crate::word::WordResult;

/// Call counters; diagnostics only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClassifierStats {
    pub adaptive_matcher_calls: u64,
    pub baseline_classify_calls: u64,
    pub char_norm_classify_calls: u64,
    pub ambig_classify_calls: u64,
    pub baseline_classes_tried: u64,
    pub char_norm_classes_tried: u64,
    pub ambig_classes_tried: u64,
    pub words_adapted_to: u64,
    pub chars_adapted_to: u64,
    pub classes_output: u64,
    pub failed_adaptations: u64,
}

fn per_call(total: u64, calls: u64) -> f64 {
    if calls == 0 {
        0.0
    } else {
        total as f64 / calls as f64
    }
}

impl fmt::Display for ClassifierStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ADAPTIVE MATCHER STATISTICS:")?;
        writeln!(
            f,
            "\tNum blobs classified = {}, avg choices = {:.2}",
            self.adaptive_matcher_calls,
            per_call(self.classes_output, self.adaptive_matcher_calls)
        )?;
        writeln!(
            f,
            "\tBaseline classifier: {} calls ({:.2} classes/call)",
            self.baseline_classify_calls,
            per_call(self.baseline_classes_tried, self.baseline_classify_calls)
        )?;
        writeln!(
            f,
            "\tChar-norm classifier: {} calls ({:.2} classes/call)",
            self.char_norm_classify_calls,
            per_call(self.char_norm_classes_tried, self.char_norm_classify_calls)
        )?;
        writeln!(
            f,
            "\tAmbig classifier: {} calls ({:.2} classes/call)",
            self.ambig_classify_calls,
            per_call(self.ambig_classes_tried, self.ambig_classify_calls)
        )?;
        writeln!(
            f,
            "\tAdapted to {} words, {} chars; {} failed adaptations",
            self.words_adapted_to, self.chars_adapted_to, self.failed_adaptations
        )
    }
}

/// Per-document classifier. One instance per document; instances share
/// only the read-only pre-trained templates.
pub struct AdaptiveClassifier<E: FeatureExtractor = OutlineFeatureExtractor> {
    config: ClassifierConfig,
    matcher_cfg: MatcherConfig,
    matcher: IntegerMatcher,
    unicharset: Arc<UnicharSet>,
    pre_trained: Arc<IntTemplates>,
    adapted: AdaptedTemplates,
    extractor: E,
    stats: ClassifierStats,
    /// Failures since the adapted templates were last rebuilt.
    failures: u32,
    learning: bool,
}

impl AdaptiveClassifier<OutlineFeatureExtractor> {
    pub fn with_default_extractor(
        config: ClassifierConfig,
        matcher_cfg: MatcherConfig,
        unicharset: Arc<UnicharSet>,
        pre_trained: Arc<IntTemplates>,
    ) -> Result<Self, EngineError> {
        let extractor = OutlineFeatureExtractor::new(matcher_cfg.pico_feature_length);
        Self::new(config, matcher_cfg, unicharset, pre_trained, extractor)
    }
}

impl<E: FeatureExtractor> AdaptiveClassifier<E> {
    /// Builds a classifier; adapted templates are loaded from
    /// `pre_adapted_templates` when configured, otherwise start empty.
    pub fn new(
        config: ClassifierConfig,
        matcher_cfg: MatcherConfig,
        unicharset: Arc<UnicharSet>,
        pre_trained: Arc<IntTemplates>,
        extractor: E,
    ) -> Result<Self, EngineError> {
        let adapted = match &config.pre_adapted_templates {
            Some(path) => {
                info!(path = %path.display(), "loading pre-adapted templates");
                persistence::load_adapted_templates(path)?
            }
            None => AdaptedTemplates::new(ClassPruner::new(matcher_cfg.pruner_buckets)),
        };
        Ok(Self {
            matcher: IntegerMatcher::new(&matcher_cfg),
            learning: config.enable_learning,
            config,
            matcher_cfg,
            unicharset,
            pre_trained,
            adapted,
            extractor,
            stats: ClassifierStats::default(),
            failures: 0,
        })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn unicharset(&self) -> &UnicharSet {
        &self.unicharset
    }

    pub fn adapted_templates(&self) -> &AdaptedTemplates {
        &self.adapted
    }

    pub fn stats(&self) -> &ClassifierStats {
        &self.stats
    }

    pub fn learning_enabled(&self) -> bool {
        self.learning
    }

    /// First recognition pass: learn from confident words.
    pub fn setup_pass1(&mut self) {
        self.learning = self.config.enable_learning;
    }

    /// Second pass re-reads the document with whatever was learned.
    pub fn setup_pass2(&mut self) {
        self.learning = false;
    }

    /// Ranked choices for one glyph, best first. Never empty.
    pub fn classify(&mut self, blob: &Blob, row: &RowContext) -> Vec<BlobChoice> {
        self.reset_if_too_many_failures();
        self.stats.adaptive_matcher_calls += 1;

        let mut results = MatchResult::new();
        match self.extractor.extract(blob, row) {
            Some(features) => {
                results.blob_length = features.blob_length;
                self.do_adaptive_match(&features, &mut results);
            }
            None => {
                trace!("unclassifiable glyph");
                results.classify_as_noise(self.config.avg_noise_size, self.config.bad_match_pad);
            }
        }

        results.remove_bad_matches(&self.unicharset, self.config.bad_match_pad, self.config.numeric_mode);
        results.sort_by_rating();
        results.remove_extra_puncs(&self.unicharset);
        let mut choices = results.to_choices(
            &self.unicharset,
            self.config.max_matches,
            self.config.rating_scale,
            self.config.certainty_scale,
        );
        if choices.is_empty() {
            choices.push(BlobChoice::empty_classification());
        }
        if self.is_large_speckle(blob, row) {
            trace!("large speckle");
            add_large_speckle_to(&mut choices, self.config.speckle_rating_penalty);
        }
        self.stats.classes_output += choices.len() as u64;
        choices
    }

    fn is_large_speckle(&self, blob: &Blob, row: &RowContext) -> bool {
        let bln = BlnTransform::for_row(row);
        let limit = BLN_X_HEIGHT * self.config.speckle_large_max_size;
        let b = blob.bounding_box();
        bln.length(b.width() as f32) < limit && bln.length(b.height() as f32) < limit
    }

    fn do_adaptive_match(&mut self, features: &BlobFeatures, results: &mut MatchResult) {
        if self.adapted.num_perm_classes < self.config.permanent_classes_min || self.config.force_char_norm {
            self.char_norm_classify(features, results);
        } else {
            let ambiguities = self.baseline_classify(features, results);
            let marginal = results.num_matches() > 0 && results.best_rating > self.config.great_threshold;
            if (marginal && !self.config.force_baseline) || results.num_matches() == 0 {
                self.char_norm_classify(features, results);
            } else if let Some(ambigs) = ambiguities.filter(|a| !a.is_empty()) {
                self.ambig_classify(features, &ambigs, results);
            }
        }

        if !results.has_nonfragment {
            results.clear_matches();
        }
        if results.num_matches() == 0 {
            results.classify_as_noise(self.config.avg_noise_size, self.config.bad_match_pad);
        }
    }

    /// Rating corrected for features no proto explains.
    fn add_match(&self, results: &mut MatchResult, class_id: ClassId, r: IntResult) {
        let rating = (r.rating + self.config.class_miss_scale * r.feature_misses as f32).min(WORST_POSSIBLE_RATING);
        trace!(class_id, rating, config = r.config, "match");
        results.add_new_result(
            class_id,
            rating,
            r.config,
            self.unicharset.is_fragment(class_id),
            self.config.bad_match_pad,
        );
    }

    /// Matches against permanent adapted configurations. Returns the
    /// ambiguity list of the best configuration.
    fn baseline_classify(&mut self, features: &BlobFeatures, results: &mut MatchResult) -> Option<Vec<ClassId>> {
        let pico = &features.baseline.pico;
        let candidates = self.adapted.pruner.prune(
            pico,
            self.matcher_cfg.pruner_keep_ratio,
            self.matcher_cfg.pruner_max_classes,
        );
        self.stats.baseline_classify_calls += 1;
        self.stats.baseline_classes_tried += candidates.len() as u64;

        for c in &candidates {
            let Some(class) = self.adapted.class(c.class_id) else {
                continue;
            };
            let r = self
                .matcher
                .match_class(&class.int_class, Some(&class.perm_protos), Some(&class.perm_configs), pico, 0.0);
            self.add_match(results, c.class_id, r);
        }
        if results.num_matches() == 0 {
            return None;
        }
        self.adapted
            .ambiguities(results.best_class, results.best_config)
            .map(<[ClassId]>::to_vec)
    }

    fn char_norm_classify(&mut self, features: &BlobFeatures, results: &mut MatchResult) {
        let pico = &features.char_norm.pico;
        let candidates = self.pre_trained.pruner.prune(
            pico,
            self.matcher_cfg.pruner_keep_ratio,
            self.matcher_cfg.pruner_max_classes,
        );
        self.stats.char_norm_classify_calls += 1;
        self.stats.char_norm_classes_tried += candidates.len() as u64;

        for c in &candidates {
            self.match_pre_trained(features, c.class_id, results);
        }
    }

    fn ambig_classify(&mut self, features: &BlobFeatures, ambiguities: &[ClassId], results: &mut MatchResult) {
        self.stats.ambig_classify_calls += 1;
        self.stats.ambig_classes_tried += ambiguities.len() as u64;
        for &class_id in ambiguities {
            self.match_pre_trained(features, class_id, results);
        }
    }

    fn match_pre_trained(&self, features: &BlobFeatures, class_id: ClassId, results: &mut MatchResult) {
        let Some(class) = self.pre_trained.class(class_id) else {
            return;
        };
        let adjust = char_norm_adjustment(class.char_norm.as_ref(), &features.stats);
        let r = self
            .matcher
            .match_class(class, None, None, &features.char_norm.pico, adjust);
        self.add_match(results, class_id, r);
    }

    /// Best rating `class_id` can achieve for the glyph in either template set.
    pub fn best_rating_for(&self, blob: &Blob, row: &RowContext, class_id: ClassId) -> f32 {
        let Some(features) = self.extractor.extract(blob, row) else {
            return WORST_POSSIBLE_RATING;
        };
        let mut best = WORST_POSSIBLE_RATING;
        if let Some(class) = self.pre_trained.class(class_id) {
            let adjust = char_norm_adjustment(class.char_norm.as_ref(), &features.stats);
            best = self
                .matcher
                .match_class(class, None, None, &features.char_norm.pico, adjust)
                .rating;
        }
        if let Some(class) = self.adapted.class(class_id).filter(|c| !c.is_empty()) {
            let r = self.matcher.match_class(
                &class.int_class,
                Some(&class.perm_protos),
                Some(&class.perm_configs),
                &features.baseline.pico,
                0.0,
            );
            best = best.min(r.rating);
        }
        best
    }

    /// Whether the word is trustworthy enough to learn from.
    pub fn adaptable_word(&self, word: &WordResult, dict: &dyn Dictionary) -> bool {
        let Some(best) = &word.best_choice else {
            return false;
        };
        let n = best.len();
        if n == 0 || n != word.word.blobs.len() || n > self.config.max_adaptable_word_size {
            return false;
        }
        if self.config.enable_new_adapt_rules {
            let factor = self.config.adaptable_word_factor;
            dict.current_best_choice_adjust_factor(word) <= factor
                && dict.alternative_choices_worse_than(word, factor)
                && dict.current_best_choice_is(word, best)
        } else {
            let Some(raw) = &word.raw_choice else {
                return false;
            };
            raw.len() == n
                && ((dict.valid_word(best) != Permuter::NoPerm && dict.case_ok(best))
                    || (dict.valid_number(best) && dict.pure_number(best)))
                && (0..=1).contains(&dict.punctuation_ok(best))
        }
    }

    /// Per-character rating a glyph must reach to confirm an existing
    /// adapted configuration instead of starting a new one.
    pub fn adapt_thresholds(&self, word: &WordResult, row: &RowContext, dict: &dyn Dictionary) -> Vec<f32> {
        let Some(best) = &word.best_choice else {
            return Vec::new();
        };
        let good = self.config.good_threshold;
        let clamp = |r: f32| (r * (1.0 - self.config.rating_margin)).clamp(self.config.perfect_threshold, good);

        if self.config.enable_new_adapt_rules && dict.current_best_choice_is(word, best) {
            // Tight enough to beat whatever the classifier wrongly preferred.
            return (0..best.len())
                .map(|i| match word.blob_choices.get(i).and_then(|c| c.first()) {
                    Some(top) if Some(top.unichar.as_str()) != best.unichar(i) => clamp(top.rating),
                    _ => good,
                })
                .collect();
        }

        let raw = word.raw_choice.as_ref();
        (0..best.len())
            .map(|i| {
                let wanted = best.unichar(i);
                if raw.and_then(|r| r.unichar(i)) == wanted {
                    return good;
                }
                let class_id = wanted.and_then(|u| self.unicharset.id_of(u));
                match (class_id, word.word.blobs.get(i)) {
                    (Some(c), Some(blob)) => clamp(self.best_rating_for(blob, row, c)),
                    _ => good,
                }
            })
            .collect()
    }

    /// Learns every accepted glyph of a recognized word.
    pub fn adapt_to_word(&mut self, word: &WordResult, row: &RowContext, dict: &dyn Dictionary) {
        if !self.learning {
            return;
        }
        let Some(best) = &word.best_choice else {
            return;
        };
        if best.len() > self.config.max_adaptable_word_size {
            return;
        }
        self.reset_if_too_many_failures();
        let thresholds = self.adapt_thresholds(word, row, dict);
        self.stats.words_adapted_to += 1;
        debug!(word = %best.string(), "adapting to word");

        let blobs = &word.word.blobs;
        let il1 = self.config.il1_adaption_test;
        for (i, blob) in blobs.iter().enumerate() {
            let Some(unichar) = best.unichar(i) else {
                break;
            };
            if !word.reject_map.accepted(i) {
                debug!(unichar, "skipping rejected char");
                continue;
            }
            let last = i + 1 == blobs.len();
            let next_lower = best.unichar(i + 1).is_some_and(unicharset::is_lower);
            let prev_alnum = i > 0 && best.unichar(i - 1).is_some_and(unicharset::is_alnum);
            let confusable = unichar == "i" || (il1 && unichar == "I" && (last || next_lower));
            if confusable && (i == 0 || !prev_alnum || (!il1 && blob.num_outlines() != 2)) {
                debug!(unichar, "not adapting to confusable i/I");
                continue;
            }
            let Some(class_id) = self.unicharset.id_of(unichar) else {
                continue;
            };
            let threshold = thresholds.get(i).copied().unwrap_or(self.config.good_threshold);
            self.adapt_to_char(blob, row, class_id, threshold);
        }
    }

    /// Learns one glyph as an example of `class_id`.
    pub fn adapt_to_char(&mut self, blob: &Blob, row: &RowContext, class_id: ClassId, threshold: f32) {
        let Some(features) = self.extractor.extract(blob, row) else {
            return;
        };
        self.stats.chars_adapted_to += 1;
        if features.blob_length > self.config.unlikely_num_features {
            debug!(class_id, features = features.blob_length, "too many features to adapt to");
            return;
        }

        if self.adapted.is_empty_class(class_id) {
            if self.adapted.init_class(class_id, &features, self.config.unlikely_num_features) {
                debug!(class_id, "first adapted config");
            }
            return;
        }

        let Some(class) = self.adapted.class(class_id) else {
            return;
        };
        let r = self
            .matcher
            .match_class(&class.int_class, None, None, &features.baseline.pico, 0.0);
        if r.rating <= threshold {
            let Some(ConfigState::Temporary(temp)) = self
                .adapted
                .classes
                .get_mut(&class_id)
                .and_then(|c| c.configs.get_mut(r.config))
            else {
                trace!(class_id, config = r.config, "matched permanent config");
                return;
            };
            temp.seen += 1;
            let seen = temp.seen;
            debug!(class_id, config = r.config, seen, rating = r.rating, "confirmed temp config");
            if seen >= self.config.min_examples_for_prototyping {
                self.make_permanent(class_id, r.config, &features);
            }
        } else if let Some(config_id) = self.make_new_temporary_config(class_id, &features) {
            let reliable = matches!(
                self.adapted.class(class_id).and_then(|c| c.config(config_id)),
                Some(ConfigState::Temporary(t)) if t.seen >= self.config.min_examples_for_prototyping
            );
            if reliable {
                self.make_permanent(class_id, config_id, &features);
            }
        }
    }

    /// Pre-trained classes the glyph is confused with, or empty when the
    /// only plausible class is `correct`.
    pub fn ambiguities_for(&mut self, features: &BlobFeatures, correct: ClassId) -> Vec<ClassId> {
        let mut results = MatchResult::new();
        results.blob_length = features.blob_length;
        self.char_norm_classify(features, &mut results);
        results.remove_bad_matches(&self.unicharset, self.config.bad_match_pad, self.config.numeric_mode);
        results.sort_by_rating();
        let n = results.num_matches();
        if n > 1 || (n == 1 && results.classes[0] != correct) {
            results.classes
        } else {
            Vec::new()
        }
    }

    fn make_permanent(&mut self, class_id: ClassId, config_id: ConfigId, features: &BlobFeatures) {
        let ambiguities = self.ambiguities_for(features, class_id);
        if self.adapted.make_permanent(class_id, config_id, ambiguities.clone()) {
            let names: Vec<&str> = ambiguities.iter().map(|&c| self.unicharset.unichar_or_space(c)).collect();
            debug!(class_id, config_id, ambiguities = ?names, "config made permanent");
        }
    }

    fn note_failure(&mut self) {
        self.failures += 1;
        self.stats.failed_adaptations += 1;
    }

    /// New temporary configuration made of the class protos the glyph
    /// already matches plus fresh protos for the features they miss.
    fn make_new_temporary_config(&mut self, class_id: ClassId, features: &BlobFeatures) -> Option<ConfigId> {
        let max_configs = self.config.max_configs_per_class;
        let max_protos = self.config.max_protos_per_class;
        let pico = &features.baseline.pico;

        let class = self.adapted.classes.get_mut(&class_id)?;
        if class.int_class.configs.len() >= max_configs {
            debug!(class_id, "no room for another config");
            self.note_failure();
            return None;
        }

        let mut mask: BitVector = self.matcher.find_good_protos(&class.int_class, pico).into_iter().collect();
        let bad = self.matcher.find_bad_features(&class.int_class, &mask, pico);
        let protos = cluster_bad_features(
            pico,
            &bad,
            self.matcher_cfg.pico_feature_length,
            self.config.clustering_max_angle_delta,
        );
        if class.int_class.protos.len() + protos.len() > max_protos {
            debug!(class_id, "no room for new protos");
            self.note_failure();
            return None;
        }
        for proto in protos {
            let proto_id = class.int_class.add_proto(proto, max_protos)?;
            mask.set(proto_id);
            class.temp_protos.push(TempProto { proto_id, proto });
        }
        let max_proto_id = class.int_class.protos.len().saturating_sub(1);
        let config_id = class.int_class.add_config(mask.clone(), max_configs)?;
        class.configs.push(ConfigState::Temporary(TempConfig::new(mask, max_proto_id)));
        debug!(class_id, config_id, bad_features = bad.len(), "new temp config");
        Some(config_id)
    }

    fn reset_if_too_many_failures(&mut self) {
        let limit = self.config.failed_adaptations_before_reset;
        if limit >= 0 && self.failures >= limit as u32 {
            warn!(failures = self.failures, "too many failed adaptations, resetting adapted templates");
            self.reset_adapted_templates();
        }
    }

    pub fn reset_adapted_templates(&mut self) {
        self.adapted = AdaptedTemplates::new(ClassPruner::new(self.matcher_cfg.pruner_buckets));
        self.failures = 0;
    }

    /// Saves the adapted templates when configured, then starts afresh
    /// for the next document.
    pub fn end_document(&mut self) -> Result<(), EngineError> {
        if let Some(path) = &self.config.save_adapted_templates {
            info!(path = %path.display(), "saving adapted templates");
            persistence::save_adapted_templates(path, &self.adapted)?;
        }
        self.reset_adapted_templates();
        Ok(())
    }

    pub fn log_statistics(&self) {
        info!(
            classes = self.adapted.num_non_empty_classes,
            permanent = self.adapted.num_perm_classes,
            protos = self.adapted.total_protos(),
            configs = self.adapted.total_configs(),
            "adapted templates"
        );
        info!("{}", self.stats);
    }
}

/// Turns runs of consecutive bad features into prototypes. A run ends when
/// the direction turns by more than `max_angle_delta` or the position
/// leaves the segment the run has covered so far.
pub fn cluster_bad_features(
    features: &[PicoFeature],
    bad: &[usize],
    pico_length: f32,
    max_angle_delta: f32,
) -> Vec<Prototype> {
    let mut protos = Vec::new();
    let mut start = 0;
    while start < bad.len() {
        let f1 = features[bad[start]];
        let mut end = start + 1;
        let mut segment = pico_length;
        while end < bad.len() {
            let f2 = features[bad[end]];
            let mut delta = (f1.dir - f2.dir).abs();
            if delta > 0.5 {
                delta = 1.0 - delta;
            }
            if delta > max_angle_delta || (f1.x - f2.x).abs() > segment || (f1.y - f2.y).abs() > segment {
                break;
            }
            end += 1;
            segment += pico_length;
        }
        let f2 = features[bad[end - 1]];
        protos.push(Prototype {
            x: (f1.x + f2.x) / 2.0,
            y: (f1.y + f2.y) / 2.0,
            angle: f1.dir,
            length: segment,
        });
        start = end;
    }
    protos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::Outline;
    use crate::dict::WordListDictionary;
    use crate::geometry::Point;
    use crate::results::WORST_POSSIBLE_RATING;
    use crate::unicharset::NO_CLASS;
    use crate::word::{RejectMap, Word, WordChoice, WordFlags};

    fn row() -> RowContext {
        RowContext::default()
    }

    fn square() -> Blob {
        Blob::new(vec![Outline::rect(0, 0, 20, 20)])
    }

    fn bar() -> Blob {
        Blob::new(vec![Outline::rect(0, 0, 4, 40)])
    }

    fn dash() -> Blob {
        Blob::new(vec![Outline::rect(0, 8, 16, 12)])
    }

    fn classifier(config: ClassifierConfig) -> AdaptiveClassifier {
        let unicharset = UnicharSet::from_unichars(["o", "l", "-"]);
        let matcher_cfg = MatcherConfig::default();
        let ex = OutlineFeatureExtractor::default();
        let mut templates = IntTemplates::new(ClassPruner::new(matcher_cfg.pruner_buckets), 512, 32);
        for (u, blob) in [("o", square()), ("l", bar()), ("-", dash())] {
            let f = ex.extract(&blob, &row()).unwrap();
            templates.add_sample(unicharset.id_of(u).unwrap(), &f).unwrap();
        }
        AdaptiveClassifier::with_default_extractor(config, matcher_cfg, Arc::new(unicharset), Arc::new(templates))
            .unwrap()
    }

    #[test]
    fn cold_start_uses_char_norm_templates() {
        let mut c = classifier(ClassifierConfig::default());
        let choices = c.classify(&square(), &row());
        assert_eq!(choices[0].unichar, "o");
        assert!(choices.windows(2).all(|w| w[0].rating <= w[1].rating));
        assert!(choices.iter().all(|ch| (0.0..=1.0).contains(&ch.rating)));
        assert_eq!(c.stats().char_norm_classify_calls, 1);
        assert_eq!(c.stats().baseline_classify_calls, 0);
    }

    #[test]
    fn classify_is_repeatable() {
        let mut c = classifier(ClassifierConfig::default());
        let a = c.classify(&bar(), &row());
        let b = c.classify(&bar(), &row());
        assert_eq!(a, b);
        assert_eq!(a[0].unichar, "l");
    }

    #[test]
    fn degenerate_glyph_is_noise() {
        let mut c = classifier(ClassifierConfig::default());
        let speck = Blob::new(vec![Outline::new(vec![Point::new(2, 2)])]);
        let choices = c.classify(&speck, &row());
        assert_eq!(choices.len(), 1);
        assert_eq!(choices[0].class_id, NO_CLASS);
    }

    #[test]
    fn repeated_examples_become_permanent() {
        let mut c = classifier(ClassifierConfig::default());
        let o = c.unicharset().id_of("o").unwrap();

        c.adapt_to_char(&square(), &row(), o, 0.125);
        let class = c.adapted_templates().class(o).unwrap();
        assert!(matches!(&class.configs[0], ConfigState::Temporary(t) if t.seen == 1));

        c.adapt_to_char(&square(), &row(), o, 0.125);
        assert!(c.adapted_templates().class(o).unwrap().configs[0].is_permanent());
        assert_eq!(c.adapted_templates().num_perm_classes, 1);

        // Adapted data now exists: the baseline path is tried first.
        let choices = c.classify(&square(), &row());
        assert_eq!(choices[0].unichar, "o");
        assert_eq!(c.stats().baseline_classify_calls, 1);
    }

    #[test]
    fn poor_match_starts_new_config() {
        let mut c = classifier(ClassifierConfig::default());
        let o = c.unicharset().id_of("o").unwrap();
        c.adapt_to_char(&square(), &row(), o, 0.125);
        c.adapt_to_char(&bar(), &row(), o, 0.125);
        let class = c.adapted_templates().class(o).unwrap();
        assert_eq!(class.configs.len(), 2);
        assert!(matches!(&class.configs[1], ConfigState::Temporary(t) if t.seen == 1));
        assert!(class.int_class.protos.len() > 4);
    }

    #[test]
    fn config_table_exhaustion_counts_failures_and_resets() {
        let config = ClassifierConfig {
            max_configs_per_class: 1,
            failed_adaptations_before_reset: 1,
            ..ClassifierConfig::default()
        };
        let mut c = classifier(config);
        let o = c.unicharset().id_of("o").unwrap();
        c.adapt_to_char(&square(), &row(), o, 0.125);
        c.adapt_to_char(&bar(), &row(), o, 0.125);
        assert_eq!(c.stats().failed_adaptations, 1);
        c.classify(&square(), &row());
        assert!(c.adapted_templates().is_empty_class(o));
    }

    #[test]
    fn learning_is_off_in_pass_two() {
        let mut c = classifier(ClassifierConfig::default());
        let dict = WordListDictionary::new(["o"]);
        let mut word = WordResult::new(Word::new(vec![square()], WordFlags::default()));
        word.best_choice = Some(WordChoice::from_text("o", Permuter::SystemDawg));
        word.raw_choice = word.best_choice.clone();
        word.reject_map = RejectMap::all_accepted(1);

        c.setup_pass2();
        assert!(!c.learning_enabled());
        c.adapt_to_word(&word, &row(), &dict);
        assert_eq!(c.stats().words_adapted_to, 0);

        c.setup_pass1();
        assert!(c.learning_enabled());
        assert!(c.adaptable_word(&word, &dict));
        c.adapt_to_word(&word, &row(), &dict);
        assert_eq!(c.stats().words_adapted_to, 1);
        assert!(!c.adapted_templates().is_empty_class(c.unicharset().id_of("o").unwrap()));
    }

    #[test]
    fn leading_i_is_not_learned() {
        let unicharset = UnicharSet::from_unichars(["i"]);
        let templates = IntTemplates::new(ClassPruner::new(24), 512, 32);
        let mut c = AdaptiveClassifier::with_default_extractor(
            ClassifierConfig::default(),
            MatcherConfig::default(),
            Arc::new(unicharset),
            Arc::new(templates),
        )
        .unwrap();
        let dict = WordListDictionary::new(["i"]);
        let mut word = WordResult::new(Word::new(vec![bar()], WordFlags::default()));
        word.best_choice = Some(WordChoice::from_text("i", Permuter::SystemDawg));
        word.reject_map = RejectMap::all_accepted(1);
        c.adapt_to_word(&word, &row(), &dict);
        assert_eq!(c.stats().chars_adapted_to, 0);
    }

    #[test]
    fn thresholds_follow_classifier_errors() {
        let c = classifier(ClassifierConfig::default());
        let dict = WordListDictionary::new(["ol"]);
        let mut word = WordResult::new(Word::new(vec![square(), bar()], WordFlags::default()));
        word.best_choice = Some(WordChoice::from_text("ol", Permuter::SystemDawg));
        let wrong = BlobChoice {
            class_id: 3,
            unichar: "-".to_string(),
            rating: 0.1,
            scaled_rating: 0.0,
            certainty: -2.0,
            config: None,
        };
        let right = BlobChoice { unichar: "o".to_string(), class_id: 1, ..wrong.clone() };
        word.blob_choices = vec![vec![right], vec![wrong]];
        let t = c.adapt_thresholds(&word, &row(), &dict);
        assert_eq!(t[0], 0.125);
        assert!((t[1] - 0.09).abs() < 1e-6);
    }

    #[test]
    fn non_dictionary_word_is_not_adaptable() {
        let c = classifier(ClassifierConfig::default());
        let dict = WordListDictionary::new(["cat"]);
        let mut word = WordResult::new(Word::new(vec![square(), dash(), square()], WordFlags::default()));
        let best = WordChoice::from_text("o-o", Permuter::NoPerm);
        word.best_choice = Some(WordChoice { adjust_factor: dict.adjust_factor(&best), ..best });
        word.raw_choice = word.best_choice.clone();
        assert!(!c.adaptable_word(&word, &dict));

        // a dictionary word loses out when a competing reading is just as plausible
        let mut word = WordResult::new(Word::new(vec![square()], WordFlags::default()));
        word.best_choice = Some(WordChoice::from_text("o", Permuter::SystemDawg));
        assert!(c.adaptable_word(&word, &dict));
        word.alt_choices = vec![WordChoice::from_text("l", Permuter::SystemDawg)];
        assert!(!c.adaptable_word(&word, &dict));
    }

    #[test]
    fn old_rules_check_the_word_list_directly() {
        let config = ClassifierConfig {
            enable_new_adapt_rules: false,
            ..ClassifierConfig::default()
        };
        let c = classifier(config);
        let dict = WordListDictionary::new(["o", "ol"]);

        let mut word = WordResult::new(Word::new(vec![square()], WordFlags::default()));
        word.best_choice = Some(WordChoice::from_text("o", Permuter::SystemDawg));
        assert!(!c.adaptable_word(&word, &dict), "raw choice is required");
        word.raw_choice = word.best_choice.clone();
        assert!(c.adaptable_word(&word, &dict));
        // the penalty the word search applied does not matter here
        word.best_choice.as_mut().unwrap().adjust_factor = 2.0;
        assert!(c.adaptable_word(&word, &dict));

        let mut stranger = WordResult::new(Word::new(vec![bar()], WordFlags::default()));
        stranger.best_choice = Some(WordChoice::from_text("l", Permuter::NoPerm));
        stranger.raw_choice = stranger.best_choice.clone();
        assert!(!c.adaptable_word(&stranger, &dict));

        let mut numeric = WordResult::new(Word::new(vec![bar()], WordFlags::default()));
        numeric.best_choice = Some(WordChoice::from_text("7", Permuter::Number));
        numeric.raw_choice = numeric.best_choice.clone();
        assert!(c.adaptable_word(&numeric, &dict));

        // raw agrees on the first char; the second is rated against its class
        let mut pair = WordResult::new(Word::new(vec![square(), bar()], WordFlags::default()));
        pair.best_choice = Some(WordChoice::from_text("ol", Permuter::SystemDawg));
        pair.raw_choice = Some(WordChoice::from_text("o-", Permuter::NoPerm));
        let l = c.unicharset().id_of("l").unwrap();
        let expected = (c.best_rating_for(&bar(), &row(), l) * (1.0 - c.config.rating_margin))
            .clamp(c.config.perfect_threshold, c.config.good_threshold);
        let t = c.adapt_thresholds(&pair, &row(), &dict);
        assert_eq!(t[0], 0.125);
        assert_eq!(t[1], expected);
    }

    #[test]
    fn forced_baseline_still_consults_ambiguities() {
        let config = ClassifierConfig {
            force_baseline: true,
            ..ClassifierConfig::default()
        };
        let mut c = classifier(config);
        let o = c.unicharset().id_of("o").unwrap();
        let l = c.unicharset().id_of("l").unwrap();
        c.adapt_to_char(&square(), &row(), o, 0.125);
        assert!(c.adapted.make_permanent(o, 0, vec![l]));

        let choices = c.classify(&square(), &row());
        assert_eq!(choices[0].unichar, "o");
        assert_eq!(c.stats().baseline_classify_calls, 1);
        assert_eq!(c.stats().ambig_classify_calls, 1);
        assert_eq!(c.stats().char_norm_classify_calls, 0);
    }

    #[test]
    fn overly_detailed_glyph_is_not_learned() {
        let config = ClassifierConfig {
            unlikely_num_features: 30,
            ..ClassifierConfig::default()
        };
        let mut c = classifier(config);
        let o = c.unicharset().id_of("o").unwrap();
        c.adapt_to_char(&square(), &row(), o, 0.125);
        assert!(c.adapted_templates().is_empty_class(o));

        // an existing temp config is not reinforced either
        c.config.unlikely_num_features = 200;
        c.adapt_to_char(&square(), &row(), o, 0.125);
        c.config.unlikely_num_features = 30;
        c.adapt_to_char(&square(), &row(), o, 0.125);
        let class = c.adapted_templates().class(o).unwrap();
        assert_eq!(class.configs.len(), 1);
        assert!(matches!(&class.configs[0], ConfigState::Temporary(t) if t.seen == 1));
    }

    #[test]
    fn small_speckle_also_offers_noise() {
        let mut c = classifier(ClassifierConfig::default());
        let speck = Blob::new(vec![Outline::rect(0, 0, 2, 2)]);
        let choices = c.classify(&speck, &row());
        assert_eq!(choices.iter().filter(|ch| ch.class_id == NO_CLASS).count(), 1);
        let last = choices.last().unwrap();
        assert_eq!(last.class_id, NO_CLASS);
        if choices.len() > 1 {
            let worst = &choices[choices.len() - 2];
            assert_eq!(last.scaled_rating, worst.scaled_rating + c.config().speckle_rating_penalty);
        }

        let choices = c.classify(&square(), &row());
        assert!(choices.iter().all(|ch| ch.class_id != NO_CLASS));
    }

    #[test]
    fn unknown_class_rates_worst() {
        let c = classifier(ClassifierConfig::default());
        assert_eq!(c.best_rating_for(&square(), &row(), 42), WORST_POSSIBLE_RATING);
    }

    #[test]
    fn bad_features_cluster_by_direction() {
        let f = |x: f32, dir: f32| PicoFeature { x, y: 0.25, dir };
        let features = vec![f(0.1, 0.0), f(0.14, 0.0), f(0.18, 0.0), f(0.2, 0.25)];
        let protos = cluster_bad_features(&features, &[0, 1, 2, 3], 0.05, 0.015);
        assert_eq!(protos.len(), 2);
        assert!((protos[0].x - 0.14).abs() < 1e-6);
        assert!((protos[0].length - 0.15).abs() < 1e-6);
        assert_eq!(protos[1].angle, 0.25);
    }
}
