use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Knobs of the adaptive classifier and learner.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub good_threshold: f32,
    pub great_threshold: f32,
    pub perfect_threshold: f32,
    pub bad_match_pad: f32,
    pub rating_margin: f32,
    pub avg_noise_size: f32,
    /// Glyphs smaller than this fraction of the x-height in both
    /// dimensions also get a noise choice.
    pub speckle_large_max_size: f32,
    pub speckle_rating_penalty: f32,
    pub permanent_classes_min: usize,
    pub min_examples_for_prototyping: u32,
    pub clustering_max_angle_delta: f32,
    pub rating_scale: f32,
    pub certainty_scale: f32,
    /// Negative disables the reset.
    pub failed_adaptations_before_reset: i32,
    pub class_miss_scale: f32,
    pub max_matches: usize,
    pub max_adaptable_word_size: usize,
    pub unlikely_num_features: usize,
    pub max_configs_per_class: usize,
    pub max_protos_per_class: usize,
    pub adaptable_word_factor: f32,
    pub enable_learning: bool,
    pub enable_new_adapt_rules: bool,
    pub il1_adaption_test: bool,
    pub numeric_mode: bool,
    pub force_char_norm: bool,
    pub force_baseline: bool,
    pub pre_adapted_templates: Option<PathBuf>,
    pub save_adapted_templates: Option<PathBuf>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            good_threshold: 0.125,
            great_threshold: 0.0,
            perfect_threshold: 0.02,
            bad_match_pad: 0.15,
            rating_margin: 0.1,
            avg_noise_size: 12.0,
            speckle_large_max_size: 0.3,
            speckle_rating_penalty: 10.0,
            permanent_classes_min: 1,
            min_examples_for_prototyping: 2,
            clustering_max_angle_delta: 0.015,
            rating_scale: 1.5,
            certainty_scale: 20.0,
            failed_adaptations_before_reset: 150,
            class_miss_scale: 0.003_906_25,
            max_matches: 10,
            max_adaptable_word_size: 40,
            unlikely_num_features: 200,
            max_configs_per_class: 32,
            max_protos_per_class: 512,
            adaptable_word_factor: 1.15,
            enable_learning: true,
            enable_new_adapt_rules: true,
            il1_adaption_test: false,
            numeric_mode: false,
            force_char_norm: false,
            force_baseline: false,
            pre_adapted_templates: None,
            save_adapted_templates: None,
        }
    }
}

/// Knobs of the prototype matcher and class pruner.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Distance (normalized units) at which positional evidence reaches zero.
    pub position_tolerance: f32,
    /// Direction difference (fraction of a turn) at which evidence reaches zero.
    pub angle_tolerance: f32,
    pub adapt_proto_threshold: f32,
    pub adapt_feature_threshold: f32,
    pub char_norm_weight: f32,
    pub pruner_buckets: u8,
    pub pruner_keep_ratio: f32,
    pub pruner_max_classes: usize,
    pub pico_feature_length: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            position_tolerance: 0.04,
            angle_tolerance: 0.05,
            adapt_proto_threshold: 0.9,
            adapt_feature_threshold: 0.9,
            char_norm_weight: 0.25,
            pruner_buckets: 24,
            pruner_keep_ratio: 0.6,
            pruner_max_classes: 20,
            pico_feature_length: 0.05,
        }
    }
}

/// Knobs of the fuzzy-space and fixed-pitch noise repair passes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FixSpaceConfig {
    pub check_for_fp_noise_space: bool,
    pub fp_eval: bool,
    pub noise_score_fixing: bool,
    pub non_noise_limit: usize,
    pub small_outlines_size: f32,
    pub ignore_punct: bool,
    pub numeric_fix: bool,
    pub prefer_joined_1s: bool,
    pub test_uniform_wd_spacing: bool,
    pub prefer_joined_punct: bool,
    pub done_mode: u8,
    pub numeric_punctuation: String,
}

impl Default for FixSpaceConfig {
    fn default() -> Self {
        Self {
            check_for_fp_noise_space: true,
            fp_eval: true,
            noise_score_fixing: true,
            non_noise_limit: 1,
            small_outlines_size: 0.28,
            ignore_punct: true,
            numeric_fix: true,
            prefer_joined_1s: true,
            test_uniform_wd_spacing: false,
            prefer_joined_punct: false,
            done_mode: 1,
            numeric_punctuation: ".,".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub classifier: ClassifierConfig,
    pub matcher: MatcherConfig,
    pub fixspace: FixSpaceConfig,
}

impl EngineConfig {
    /// Loads a JSON config; missing fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"classifier": {"numeric_mode": true}, "fixspace": {"done_mode": 2}}"#)
                .unwrap();
        assert!(cfg.classifier.numeric_mode);
        assert_eq!(cfg.classifier.max_matches, 10);
        assert_eq!(cfg.fixspace.done_mode, 2);
        assert_eq!(cfg.fixspace.numeric_punctuation, ".,");
        assert_eq!(cfg.matcher.pruner_buckets, 24);
    }
}
