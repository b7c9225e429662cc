use tracing::trace;

use crate::blob::RowContext;
use crate::classifier::AdaptiveClassifier;
use crate::dict::{Dictionary, Permuter, WordListDictionary};
use crate::features::FeatureExtractor;
use crate::results::BlobChoice;
use crate::word::{RejectMap, WordChoice, WordResult};

/// Second-pass word classification used by the spacing repair. Fills in
/// the best choice, reject map and the done / accepted / failed flags.
pub trait WordRecognizer {
    fn recognize_word(&mut self, word: &mut WordResult, row: &RowContext);
}

/// Classifies each glyph with the adaptive classifier and validates the
/// resulting string against a word list.
pub struct AdaptiveWordRecognizer<'a, E: FeatureExtractor> {
    classifier: &'a mut AdaptiveClassifier<E>,
    dict: &'a WordListDictionary,
    /// Glyphs rated worse than this are rejected.
    accept_rating: f32,
}

impl<'a, E: FeatureExtractor> AdaptiveWordRecognizer<'a, E> {
    pub fn new(classifier: &'a mut AdaptiveClassifier<E>, dict: &'a WordListDictionary) -> Self {
        Self {
            classifier,
            dict,
            accept_rating: 0.3,
        }
    }

    pub fn with_accept_rating(mut self, rating: f32) -> Self {
        self.accept_rating = rating;
        self
    }
}

impl<E: FeatureExtractor> AdaptiveWordRecognizer<'_, E> {
    /// Strings one glyph substitution away from `best`, each validated and
    /// penalized like the best choice.
    fn alternatives(&self, best: &WordChoice, blob_choices: &[Vec<BlobChoice>]) -> Vec<WordChoice> {
        let mut alts: Vec<WordChoice> = Vec::new();
        for (i, choices) in blob_choices.iter().enumerate() {
            let Some(top) = choices.first() else {
                continue;
            };
            for other in choices.iter().skip(1).filter(|c| c.unichar != " ") {
                let mut unichars = best.unichars.clone();
                unichars[i] = other.unichar.clone();
                if unichars == best.unichars || alts.iter().any(|a| a.unichars == unichars) {
                    continue;
                }
                let mut alt = WordChoice::new(unichars, Permuter::NoPerm);
                alt.rating = best.rating - top.scaled_rating + other.scaled_rating;
                alt.certainty = best.certainty.min(other.certainty);
                alt.permuter = self.dict.permuter_for(&alt);
                alt.adjust_factor = self.dict.adjust_factor(&alt);
                alts.push(alt);
            }
        }
        alts
    }
}

impl<E: FeatureExtractor> WordRecognizer for AdaptiveWordRecognizer<'_, E> {
    fn recognize_word(&mut self, word: &mut WordResult, row: &RowContext) {
        word.reset_outputs();
        if word.word.blobs.is_empty() {
            word.tess_failed = true;
            return;
        }

        let mut unichars = Vec::with_capacity(word.word.blobs.len());
        let mut accepted = Vec::with_capacity(word.word.blobs.len());
        let mut rating = 0.0;
        let mut certainty = 0.0f32;
        for blob in &word.word.blobs {
            let choices = self.classifier.classify(blob, row);
            let top = choices.first().cloned().unwrap_or_else(BlobChoice::empty_classification);
            unichars.push(top.unichar.clone());
            accepted.push(top.rating <= self.accept_rating && top.unichar != " ");
            rating += top.scaled_rating;
            certainty = certainty.min(top.certainty);
            word.blob_choices.push(choices);
        }

        let mut best = WordChoice::new(unichars, Permuter::NoPerm);
        best.rating = rating;
        best.certainty = certainty;
        let raw = best.clone();
        best.permuter = self.dict.permuter_for(&best);
        best.adjust_factor = self.dict.adjust_factor(&best);
        word.alt_choices = self.alternatives(&best, &word.blob_choices);

        let all_accepted = accepted.iter().all(|a| *a);
        word.reject_map = RejectMap::from_flags(accepted);
        word.tess_accepted = best.permuter != Permuter::NoPerm && all_accepted;
        word.done = word.tess_accepted && (best.permuter.is_dawg() || best.permuter == Permuter::Number);
        trace!(word = %best.string(), permuter = ?best.permuter, done = word.done, "recognized");
        word.raw_choice = Some(raw);
        word.best_choice = Some(best);
    }
}

/// Runs the first pass over a row: recognize every word and learn from the
/// ones that qualify.
pub fn recognize_and_adapt<E: FeatureExtractor>(
    classifier: &mut AdaptiveClassifier<E>,
    dict: &WordListDictionary,
    words: &mut [WordResult],
    row: &RowContext,
) {
    for word in words.iter_mut() {
        AdaptiveWordRecognizer::new(classifier, dict).recognize_word(word, row);
        if classifier.adaptable_word(word, dict) {
            classifier.adapt_to_word(word, row, dict);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::blob::{Blob, Outline};
    use crate::dict::{ADJUST_FACTOR_DICT_WORD, ADJUST_FACTOR_NON_WORD};
    use crate::features::OutlineFeatureExtractor;
    use crate::pruner::ClassPruner;
    use crate::templates::IntTemplates;
    use crate::types::{ClassifierConfig, MatcherConfig};
    use crate::unicharset::UnicharSet;
    use crate::word::{Word, WordFlags};

    fn square(left: i32) -> Blob {
        Blob::new(vec![Outline::rect(left, 0, left + 20, 20)])
    }

    fn bar(left: i32) -> Blob {
        Blob::new(vec![Outline::rect(left, 0, left + 4, 40)])
    }

    fn dash(left: i32) -> Blob {
        Blob::new(vec![Outline::rect(left, 8, left + 16, 12)])
    }

    fn classifier() -> AdaptiveClassifier {
        let row = RowContext::default();
        let unicharset = UnicharSet::from_unichars(["o", "l", "-"]);
        let matcher_cfg = MatcherConfig::default();
        let ex = OutlineFeatureExtractor::default();
        let mut templates = IntTemplates::new(ClassPruner::new(matcher_cfg.pruner_buckets), 512, 32);
        for (u, blob) in [("o", square(0)), ("l", bar(0)), ("-", dash(0))] {
            let f = ex.extract(&blob, &row).unwrap();
            templates.add_sample(unicharset.id_of(u).unwrap(), &f).unwrap();
        }
        AdaptiveClassifier::with_default_extractor(
            ClassifierConfig::default(),
            matcher_cfg,
            Arc::new(unicharset),
            Arc::new(templates),
        )
        .unwrap()
    }

    fn word(blobs: Vec<Blob>) -> WordResult {
        WordResult::new(Word::new(blobs, WordFlags::default()))
    }

    #[test]
    fn dictionary_word_is_unpenalized_and_adaptable() {
        let mut c = classifier();
        let dict = WordListDictionary::new(["olo"]);
        let mut w = word(vec![square(0), bar(24), square(40)]);
        AdaptiveWordRecognizer::new(&mut c, &dict).recognize_word(&mut w, &RowContext::default());

        let best = w.best_choice.as_ref().unwrap();
        assert_eq!(best.string(), "olo");
        assert_eq!(best.permuter, Permuter::SystemDawg);
        assert_eq!(best.adjust_factor, ADJUST_FACTOR_DICT_WORD);
        assert!(w.alt_choices.iter().all(|a| a.string() != "olo"));
        assert!(w.alt_choices.iter().all(|a| a.adjust_factor == ADJUST_FACTOR_NON_WORD));
        assert!(c.adaptable_word(&w, &dict));
    }

    #[test]
    fn non_dictionary_word_is_not_learned() {
        let mut c = classifier();
        let dict = WordListDictionary::new(["cat"]);
        let row = RowContext::default();
        let mut words = vec![word(vec![square(0), dash(24), square(44)])];
        c.setup_pass1();
        recognize_and_adapt(&mut c, &dict, &mut words, &row);

        let best = words[0].best_choice.as_ref().unwrap();
        assert_eq!(best.string(), "o-o");
        assert_eq!(best.permuter, Permuter::NoPerm);
        assert!(best.adjust_factor > c.config().adaptable_word_factor);
        assert!(!c.adaptable_word(&words[0], &dict));
        assert!(!words[0].tess_accepted);
        assert_eq!(c.stats().words_adapted_to, 0);
        assert_eq!(c.stats().chars_adapted_to, 0);
    }

    #[test]
    fn strict_accept_rating_rejects_every_glyph() {
        let mut c = classifier();
        let dict = WordListDictionary::new(["olo"]);
        let mut w = word(vec![square(0), bar(24), square(40)]);
        AdaptiveWordRecognizer::new(&mut c, &dict)
            .with_accept_rating(-1.0)
            .recognize_word(&mut w, &RowContext::default());
        assert_eq!(w.best_string(), "olo");
        assert_eq!(w.reject_map.reject_count(), 3);
        assert!(!w.tess_accepted);
        assert!(!w.done);
    }

    #[test]
    fn empty_word_fails() {
        let mut c = classifier();
        let dict = WordListDictionary::default();
        let mut w = word(Vec::new());
        AdaptiveWordRecognizer::new(&mut c, &dict).recognize_word(&mut w, &RowContext::default());
        assert!(w.tess_failed);
        assert!(w.best_choice.is_none());
    }
}
