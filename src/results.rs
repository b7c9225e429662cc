use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::templates::ConfigId;
use crate::unicharset::{ClassId, UnicharSet, NO_CLASS};

pub const WORST_POSSIBLE_RATING: f32 = 1.0;

const ROMANS: &str = "i v x I V X";
const PUNC_CHARS: &str = ". , ; : / ` ~ ' - = \\ | \" ! _ ^";
const DIGIT_CHARS: &str = "0 1 2 3 4 5 6 7 8 9";

/// One ranked classification of a glyph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlobChoice {
    pub class_id: ClassId,
    pub unichar: String,
    /// Raw match rating, 0 = perfect, 1 = worst.
    pub rating: f32,
    /// Rating scaled by glyph length, for word-level search.
    pub scaled_rating: f32,
    /// Negative, higher is more certain.
    pub certainty: f32,
    pub config: Option<ConfigId>,
}

impl BlobChoice {
    /// Placeholder returned when classification produced nothing at all.
    pub fn empty_classification() -> Self {
        Self {
            class_id: NO_CLASS,
            unichar: " ".to_string(),
            rating: WORST_POSSIBLE_RATING,
            scaled_rating: 50.0,
            certainty: -20.0,
            config: None,
        }
    }
}

/// Appends a noise choice ranked after every real one, unless the list
/// already offers noise.
pub fn add_large_speckle_to(choices: &mut Vec<BlobChoice>, penalty: f32) {
    if choices.iter().any(|c| c.class_id == NO_CLASS) {
        return;
    }
    let Some(worst) = choices.last() else {
        choices.push(BlobChoice::empty_classification());
        return;
    };
    let speckle = BlobChoice {
        class_id: NO_CLASS,
        unichar: " ".to_string(),
        rating: WORST_POSSIBLE_RATING,
        scaled_rating: worst.scaled_rating + penalty,
        certainty: worst.certainty,
        config: None,
    };
    choices.push(speckle);
}

/// Comparison context for ordering matched classes by their rating.
pub struct RatingOrder<'a> {
    ratings: &'a BTreeMap<ClassId, f32>,
}

impl<'a> RatingOrder<'a> {
    pub fn new(ratings: &'a BTreeMap<ClassId, f32>) -> Self {
        Self { ratings }
    }

    pub fn compare(&self, a: &ClassId, b: &ClassId) -> Ordering {
        let ra = self.ratings.get(a).copied().unwrap_or(WORST_POSSIBLE_RATING);
        let rb = self.ratings.get(b).copied().unwrap_or(WORST_POSSIBLE_RATING);
        ra.partial_cmp(&rb).unwrap_or(Ordering::Equal)
    }
}

/// Accumulated class ratings for one glyph.
#[derive(Clone, Debug)]
pub struct MatchResult {
    pub blob_length: usize,
    /// Matched classes, in insertion order until sorted.
    pub classes: Vec<ClassId>,
    ratings: BTreeMap<ClassId, f32>,
    configs: BTreeMap<ClassId, ConfigId>,
    pub best_rating: f32,
    pub best_class: ClassId,
    pub best_config: ConfigId,
    pub has_nonfragment: bool,
}

impl Default for MatchResult {
    fn default() -> Self {
        Self {
            blob_length: 0,
            classes: Vec::new(),
            ratings: BTreeMap::new(),
            configs: BTreeMap::new(),
            best_rating: WORST_POSSIBLE_RATING,
            best_class: NO_CLASS,
            best_config: 0,
            has_nonfragment: false,
        }
    }
}

impl MatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_matches(&self) -> usize {
        self.classes.len()
    }

    pub fn rating(&self, class_id: ClassId) -> f32 {
        self.ratings.get(&class_id).copied().unwrap_or(WORST_POSSIBLE_RATING)
    }

    pub fn config(&self, class_id: ClassId) -> Option<ConfigId> {
        self.configs.get(&class_id).copied()
    }

    /// Records `rating` for `class_id` if it improves the class and lies
    /// within `pad` of the best rating so far. Fragments never become best.
    pub fn add_new_result(&mut self, class_id: ClassId, rating: f32, config: ConfigId, is_fragment: bool, pad: f32) {
        let old = self.ratings.get(&class_id).copied();
        if rating > self.best_rating + pad || rating >= old.unwrap_or(WORST_POSSIBLE_RATING) {
            return;
        }
        if !is_fragment {
            self.has_nonfragment = true;
        }
        self.ratings.insert(class_id, rating);
        self.configs.insert(class_id, config);
        if rating < self.best_rating && !is_fragment {
            self.best_rating = rating;
            self.best_class = class_id;
            self.best_config = config;
        }
        if old.is_none() {
            self.classes.push(class_id);
        }
    }

    /// Drops every class rated worse than best + `pad`. In numeric mode
    /// letters are dropped as well, except roman numerals, and a
    /// surviving "l" or "O" is replaced by "1" or "0".
    pub fn remove_bad_matches(&mut self, unicharset: &UnicharSet, pad: f32, numeric_mode: bool) {
        let threshold = self.best_rating + pad;
        if !numeric_mode {
            let ratings = &self.ratings;
            self.classes
                .retain(|c| ratings.get(c).copied().unwrap_or(WORST_POSSIBLE_RATING) <= threshold);
            return;
        }

        let one = unicharset.id_of("1");
        let zero = unicharset.id_of("0");
        let mut kept: Vec<ClassId> = Vec::with_capacity(self.classes.len());
        for &class_id in &self.classes {
            let rating = self.rating(class_id);
            if rating > threshold {
                continue;
            }
            let unichar = unicharset.unichar_or_space(class_id);
            if !unicharset.is_alpha(class_id) || ROMANS.contains(unichar) {
                kept.push(class_id);
                continue;
            }
            let swap = match unichar {
                "l" => one,
                "O" => zero,
                _ => None,
            };
            if let Some(digit) = swap {
                if self.rating(digit) >= threshold {
                    self.ratings.insert(digit, rating);
                    kept.push(digit);
                }
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        kept.retain(|c| seen.insert(*c));
        self.classes = kept;
    }

    pub fn sort_by_rating(&mut self) {
        let order = RatingOrder::new(&self.ratings);
        self.classes.sort_by(|a, b| order.compare(a, b));
    }

    /// Keeps at most two punctuation and one digit class.
    pub fn remove_extra_puncs(&mut self, unicharset: &UnicharSet) {
        let mut punc_count = 0;
        let mut digit_count = 0;
        self.classes.retain(|&c| {
            let u = unicharset.unichar_or_space(c);
            if PUNC_CHARS.contains(u) {
                punc_count += 1;
                punc_count <= 2
            } else if DIGIT_CHARS.contains(u) {
                digit_count += 1;
                digit_count <= 1
            } else {
                true
            }
        });
    }

    /// Converts the (sorted) matches into at most `max_matches` choices,
    /// reserving the last slot for a non-fragment if only fragments came
    /// before it.
    pub fn to_choices(
        &mut self,
        unicharset: &UnicharSet,
        max_matches: usize,
        rating_scale: f32,
        certainty_scale: f32,
    ) -> Vec<BlobChoice> {
        let mut choices = Vec::new();
        let mut contains_nonfrag = false;
        for &class_id in &self.classes {
            let is_frag = unicharset.is_fragment(class_id);
            if choices.len() + 1 == max_matches && !contains_nonfrag && is_frag {
                continue;
            }
            let rating = self.rating(class_id);
            choices.push(BlobChoice {
                class_id,
                unichar: unicharset.unichar_or_space(class_id).to_string(),
                rating,
                scaled_rating: rating * rating_scale * self.blob_length as f32,
                certainty: -certainty_scale * rating,
                config: self.config(class_id),
            });
            contains_nonfrag |= !is_frag;
            if choices.len() >= max_matches {
                break;
            }
        }
        let kept: Vec<ClassId> = choices.iter().map(|c| c.class_id).collect();
        self.classes = kept;
        choices
    }

    /// Adds the noise class, rated by how long the glyph outline is
    /// compared to a typical speck.
    pub fn classify_as_noise(&mut self, avg_noise_size: f32, pad: f32) {
        let mut rating = self.blob_length as f32 / avg_noise_size;
        rating *= rating;
        rating /= 1.0 + rating;
        self.add_new_result(NO_CLASS, rating, 0, false, pad);
    }

    /// Discards every match but keeps the glyph length.
    pub fn clear_matches(&mut self) {
        self.classes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> UnicharSet {
        UnicharSet::from_unichars(["a", "l", "1", "O", "0", ".", ",", "'", "5", "|a|0|2|", "I"])
    }

    #[test]
    fn add_if_better_keeps_minimum() {
        let mut r = MatchResult::new();
        r.add_new_result(1, 0.3, 0, false, 0.15);
        r.add_new_result(1, 0.4, 1, false, 0.15);
        assert_eq!(r.rating(1), 0.3);
        r.add_new_result(1, 0.2, 2, false, 0.15);
        assert_eq!(r.rating(1), 0.2);
        assert_eq!(r.config(1), Some(2));
        assert_eq!(r.num_matches(), 1);
        assert_eq!(r.best_class, 1);
        // beyond the pad of the current best
        r.add_new_result(2, 0.5, 0, false, 0.15);
        assert_eq!(r.num_matches(), 1);
    }

    #[test]
    fn fragments_never_become_best() {
        let s = set();
        let frag = s.id_of("|a|0|2|").unwrap();
        let mut r = MatchResult::new();
        r.add_new_result(frag, 0.1, 0, true, 0.15);
        assert_eq!(r.best_class, NO_CLASS);
        assert!(!r.has_nonfragment);
        assert_eq!(r.num_matches(), 1);
    }

    #[test]
    fn bad_matches_are_removed() {
        let s = set();
        let mut r = MatchResult::new();
        r.add_new_result(1, 0.1, 0, false, 0.15);
        r.add_new_result(2, 0.2, 0, false, 0.15);
        r.add_new_result(3, 0.24, 0, false, 0.15);
        r.add_new_result(1, 0.05, 0, false, 0.15);
        r.remove_bad_matches(&s, 0.15, false);
        assert_eq!(r.classes, vec![1, 2]);
    }

    #[test]
    fn numeric_mode_swaps_letters_for_digits() {
        let s = set();
        let l = s.id_of("l").unwrap();
        let one = s.id_of("1").unwrap();
        let a = s.id_of("a").unwrap();
        let i_upper = s.id_of("I").unwrap();
        let mut r = MatchResult::new();
        r.add_new_result(l, 0.1, 0, false, 0.15);
        r.add_new_result(a, 0.12, 0, false, 0.15);
        r.add_new_result(i_upper, 0.13, 0, false, 0.15);
        r.remove_bad_matches(&s, 0.15, true);
        assert_eq!(r.classes, vec![one, i_upper]);
        assert_eq!(r.rating(one), 0.1);
    }

    #[test]
    fn extra_puncs_and_digits_are_capped() {
        let s = set();
        let mut r = MatchResult::new();
        for (i, u) in [".", ",", "'", "0", "5", "a"].iter().enumerate() {
            r.add_new_result(s.id_of(u).unwrap(), 0.1 + i as f32 * 0.01, 0, false, 0.15);
        }
        r.sort_by_rating();
        r.remove_extra_puncs(&s);
        let kept: Vec<&str> = r.classes.iter().map(|&c| s.unichar_or_space(c)).collect();
        assert_eq!(kept, vec![".", ",", "0", "a"]);
    }

    #[test]
    fn choices_are_scaled_and_capped() {
        let s = set();
        let mut r = MatchResult::new();
        r.blob_length = 10;
        r.add_new_result(1, 0.2, 0, false, 0.15);
        r.add_new_result(2, 0.1, 0, false, 0.15);
        r.sort_by_rating();
        let choices = r.to_choices(&s, 1, 1.5, 20.0);
        assert_eq!(choices.len(), 1);
        assert_eq!(choices[0].class_id, 2);
        assert!((choices[0].scaled_rating - 1.5).abs() < 1e-5);
        assert!((choices[0].certainty + 2.0).abs() < 1e-5);
    }

    #[test]
    fn last_slot_is_kept_for_a_nonfragment() {
        let s = set();
        let frag = s.id_of("|a|0|2|").unwrap();
        let mut r = MatchResult::new();
        r.add_new_result(frag, 0.05, 0, true, 0.15);
        r.add_new_result(1, 0.1, 0, false, 0.15);
        r.sort_by_rating();
        let choices = r.to_choices(&s, 1, 1.5, 20.0);
        assert_eq!(choices[0].class_id, 1);
    }

    #[test]
    fn noise_rating_grows_with_length() {
        let mut short = MatchResult::new();
        short.blob_length = 0;
        short.classify_as_noise(12.0, 0.15);
        assert_eq!(short.rating(NO_CLASS), 0.0);

        let mut long = MatchResult::new();
        long.blob_length = 12;
        long.classify_as_noise(12.0, 0.15);
        assert!((long.rating(NO_CLASS) - 0.5).abs() < 1e-6);
    }
}
