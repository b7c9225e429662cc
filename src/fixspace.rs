//! Word-spacing repair.
//!
//! Runs of words separated by fuzzy spaces are re-segmented by merging
//! across the narrowest gaps, one gap size at a time, keeping whichever
//! arrangement confirms the most characters. Fixed-pitch words are also
//! checked for noise specks that were glued in place of a space.

use tracing::{debug, trace};

use crate::blob::RowContext;
use crate::dict::{Dictionary, Permuter};
use crate::geometry::BlnTransform;
use crate::monitor::ProgressMonitor;
use crate::noise::{self, blob_noise_score};
use crate::page::Page;
use crate::recognizer::WordRecognizer;
use crate::types::FixSpaceConfig;
use crate::unicharset;
use crate::word::WordResult;

/// Score of an arrangement in which every word is confirmed.
pub const PERFECT_WERDS: i32 = 999;

const CONFLICT_SET_I_L_1: &str = "Il1";
const JOINED_PUNCT_CHARS: &str = "!\"`',.:;";
const SPACING_PUNCT_CHARS: &str = "\"`',.:;";
/// Gap histogram range, in normalized units.
const MAX_SPACING: i32 = 128;

pub struct SpaceFixer<'a, R: WordRecognizer> {
    config: &'a FixSpaceConfig,
    dict: &'a dyn Dictionary,
    recognizer: &'a mut R,
}

fn first_unichar(word: &WordResult) -> &str {
    word.best_choice.as_ref().and_then(|c| c.unichar(0)).unwrap_or("")
}

fn last_unichar(word: &WordResult) -> &str {
    word.best_choice
        .as_ref()
        .and_then(|c| c.unichars.last())
        .map(String::as_str)
        .unwrap_or("")
}

fn permuter_of(word: &WordResult) -> Permuter {
    word.best_choice.as_ref().map(|c| c.permuter).unwrap_or_default()
}

/// Adds one to the score for every character next to a joined `target`.
fn joined_bonus<F: Fn(&str) -> bool>(word: &WordResult, len: usize, target: F) -> i32 {
    let Some(choice) = &word.best_choice else {
        return 0;
    };
    let mut bonus = 0;
    let mut prev = false;
    for i in 0..len {
        let current = choice.unichar(i).is_some_and(&target);
        if prev || (current && i > 0) {
            bonus += 1;
        }
        prev = current;
    }
    bonus
}

/// Simple gap histogram clamped to `[0, MAX_SPACING)`.
#[derive(Default)]
struct GapStats {
    gaps: Vec<i32>,
}

impl GapStats {
    fn add(&mut self, gap: i32, count: usize) {
        let g = gap.clamp(0, MAX_SPACING - 1);
        self.gaps.extend(std::iter::repeat(g).take(count));
    }

    fn total(&self) -> usize {
        self.gaps.len()
    }

    fn mean(&self) -> f32 {
        if self.gaps.is_empty() {
            return 0.0;
        }
        self.gaps.iter().sum::<i32>() as f32 / self.gaps.len() as f32
    }

    fn median(&self) -> f32 {
        let mut sorted = self.gaps.clone();
        sorted.sort_unstable();
        let n = sorted.len();
        match n {
            0 => 0.0,
            _ if n % 2 == 1 => sorted[n / 2] as f32,
            _ => (sorted[n / 2 - 1] + sorted[n / 2]) as f32 / 2.0,
        }
    }
}

/// Whether the glyphs of a word are evenly enough spaced to be one word.
pub fn uniformly_spaced(word: &WordResult, row: &RowContext, cfg: &FixSpaceConfig) -> bool {
    let bln = BlnTransform::for_row(row);
    let mut stats = GapStats::default();
    let mut max_gap = i32::MIN;
    let mut max_gap_count = 0;
    let mut prev_right: Option<i32> = None;
    let unichar = |i: usize| {
        word.best_choice
            .as_ref()
            .and_then(|c| c.unichar(i))
            .unwrap_or("")
    };
    let is_punct = |u: &str| !u.is_empty() && SPACING_PUNCT_CHARS.contains(u);

    for (i, blob) in word.word.blobs.iter().enumerate() {
        let b = blob.bounding_box();
        if let Some(right) = prev_right {
            if !cfg.ignore_punct || (!is_punct(unichar(i - 1)) && !is_punct(unichar(i))) {
                let gap = bln.length((b.left - right) as f32).round() as i32;
                if gap < max_gap {
                    stats.add(gap, 1);
                } else if gap == max_gap {
                    max_gap_count += 1;
                } else {
                    if max_gap_count > 0 {
                        stats.add(max_gap, max_gap_count);
                    }
                    max_gap = gap;
                    max_gap_count = 1;
                }
            }
        }
        prev_right = Some(b.right);
    }

    let max_non_space = bln.length(row.max_non_space());
    let max = max_gap as f32;
    let total = stats.total();
    let result = total == 0
        || max <= max_non_space
        || (total > 2 && max <= 2.0 * stats.median())
        || (total <= 2 && max <= 2.0 * stats.mean());
    trace!(
        word = %word.best_string(),
        max_non_space,
        max_gap,
        max_gap_count,
        total,
        result,
        "uniform spacing"
    );
    result
}

/// A word counts as confirmed for spacing purposes when it is done, or
/// (depending on the done mode) accepted and validated by a word list or
/// as a number. Ambiguity does not matter here.
pub fn fixspace_thinks_word_done(word: &WordResult, cfg: &FixSpaceConfig) -> bool {
    if word.done {
        return true;
    }
    let Some(best) = &word.best_choice else {
        return false;
    };
    let mode = cfg.done_mode;
    mode > 0
        && (word.tess_accepted || (mode == 2 && word.reject_map.reject_count() == 0) || mode == 3)
        && !best.string().contains(' ')
        && (best.permuter.is_dawg() || best.permuter == Permuter::Number)
}

/// Merges every adjacent pair separated by the narrowest gap in the list.
/// Clears the list when there is no gap left to close.
pub fn transform_to_next_perm(words: &mut Vec<WordResult>) {
    let mut min_gap: Option<i32> = None;
    let mut prev_right: Option<i32> = None;
    for w in words.iter().filter(|w| !w.part_of_combo) {
        let b = w.word.bounding_box();
        if let Some(right) = prev_right {
            let gap = b.left - right;
            min_gap = Some(min_gap.map_or(gap, |m| m.min(gap)));
        }
        prev_right = Some(b.right);
    }
    let Some(min_gap) = min_gap else {
        words.clear();
        return;
    };

    let mut prev = 0;
    let mut prev_right: Option<i32> = None;
    let mut i = 0;
    while i < words.len() {
        if words[i].part_of_combo {
            i += 1;
            continue;
        }
        let b = words[i].word.bounding_box();
        if let Some(right) = prev_right {
            if b.left - right <= min_gap {
                if !words[prev].combination {
                    let combo = WordResult::combination_of(&words[prev]);
                    words[prev].part_of_combo = true;
                    words.insert(prev, combo);
                    i += 1;
                }
                let eol = words[i].word.flags.eol;
                words[prev].word.flags.eol = eol;
                if words[i].combination {
                    let absorbed = words.remove(i);
                    let combo = &mut words[prev];
                    combo.word.join_on(absorbed.word);
                    combo.reset_outputs();
                    prev_right = Some(b.right);
                    continue;
                }
                let (head, tail) = words.split_at_mut(i);
                let combo = &mut head[prev];
                let current = &mut tail[0];
                combo.copy_on(current);
                combo.word.flags.bol |= current.word.flags.bol;
                current.part_of_combo = true;
                combo.reset_outputs();
            } else {
                prev = i;
            }
        }
        prev_right = Some(b.right);
        i += 1;
    }
}

/// Fresh working list holding copies of the plain words of a run.
fn initialise_search(run: &[WordResult]) -> Vec<WordResult> {
    run.iter()
        .filter(|w| !w.combination)
        .map(|w| {
            let mut copy = w.clone();
            copy.combination = false;
            copy.part_of_combo = false;
            copy
        })
        .collect()
}

fn dump_words(words: &[WordResult], score: i32, stage: &str, improved: bool) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    let text: Vec<String> = words
        .iter()
        .filter(|w| !w.part_of_combo)
        .map(|w| format!("{}{}", if w.combination { "+" } else { "" }, w.best_string()))
        .collect();
    debug!(stage, score, improved, words = %text.join(" "), "spacing permutation");
}

fn collapse(words: &mut Vec<WordResult>) {
    words.retain(|w| !w.part_of_combo);
    for w in words.iter_mut() {
        w.combination = false;
    }
}

impl<'a, R: WordRecognizer> SpaceFixer<'a, R> {
    pub fn new(config: &'a FixSpaceConfig, dict: &'a dyn Dictionary, recognizer: &'a mut R) -> Self {
        Self {
            config,
            dict,
            recognizer,
        }
    }

    /// Repairs every fuzzy-space run and every noisy fixed-pitch word of the
    /// page. Stops early (between words) when the monitor is cancelled.
    pub fn fix_fuzzy_spaces(&mut self, page: &mut Page, monitor: Option<&ProgressMonitor>) {
        let word_count = page.word_count().max(1);
        let mut word_index = 0usize;
        let mut tick = |monitor: Option<&ProgressMonitor>| {
            word_index += 1;
            if let Some(m) = monitor {
                m.mark_alive();
                m.set_progress((90 + 5 * word_index / word_count) as u32);
            }
        };

        for row in page.rows_mut() {
            let context = row.context;
            let words = &mut row.words;
            let mut i = 0;
            while i < words.len() {
                if monitor.is_some_and(ProgressMonitor::is_cancelled) {
                    debug!("spacing repair cancelled");
                    return;
                }
                let starts_run = !words[i].combination
                    && words
                        .get(i + 1)
                        .is_some_and(|next| next.word.flags.fuzzy_sp || next.word.flags.fuzzy_non);
                if !starts_run {
                    i = self.fix_sp_fp_word(words, i, &context);
                    tick(monitor);
                    i += 1;
                    continue;
                }

                let mut end = i + 1;
                while words
                    .get(end + 1)
                    .is_some_and(|next| next.word.flags.fuzzy_sp || next.word.flags.fuzzy_non)
                {
                    end += 1;
                }
                tick(monitor);
                if words[i..=end].iter().any(|w| w.word.blobs.is_empty()) {
                    i = self.fix_sp_fp_word(words, end, &context);
                    i += 1;
                    continue;
                }

                let mut run: Vec<WordResult> = words.drain(i..=end).collect();
                self.fix_fuzzy_space_list(&mut run, &context);
                collapse(&mut run);
                let n = run.len();
                words.splice(i..i, run);
                i += n;
            }
        }
    }

    /// Replaces `run` with the best-scoring arrangement of its words.
    pub fn fix_fuzzy_space_list(&mut self, run: &mut Vec<WordResult>, row: &RowContext) {
        let mut best_score = self.eval_word_spacing(run, row);
        let mut improved = false;
        dump_words(run, best_score, "EXTRACTED", improved);

        let mut current = if best_score != PERFECT_WERDS {
            initialise_search(run)
        } else {
            Vec::new()
        };
        while best_score != PERFECT_WERDS && !current.is_empty() {
            self.match_current_words(&mut current, row);
            let score = self.eval_word_spacing(&current, row);
            dump_words(&current, score, "TESTED", improved);
            if score > best_score {
                *run = current.clone();
                best_score = score;
                improved = true;
            }
            if score < PERFECT_WERDS {
                transform_to_next_perm(&mut current);
            }
        }
        dump_words(run, best_score, "RETURNED", improved);
    }

    fn match_current_words(&mut self, words: &mut [WordResult], row: &RowContext) {
        for w in words.iter_mut() {
            if !w.part_of_combo && !w.is_recognized() {
                self.recognizer.recognize_word(w, row);
            }
        }
    }

    /// First character is a digit, or numeric punctuation of a number.
    pub fn digit_or_numeric_punct(&self, word: &WordResult, index: usize) -> bool {
        let Some(u) = word.best_choice.as_ref().and_then(|c| c.unichar(index)) else {
            return false;
        };
        unicharset::is_digit(u)
            || (self.config.numeric_fix
                && permuter_of(word) == Permuter::Number
                && !u.is_empty()
                && self.config.numeric_punctuation.contains(u))
    }

    /// Number of characters in confirmed words, plus small bonuses for
    /// joined "1"s (and optionally punctuation). A confirmed word is not
    /// counted when a "1"-like character and a digit meet across the space
    /// before it, so "561 63" scores lower than "56163".
    pub fn eval_word_spacing(&self, words: &[WordResult], row: &RowContext) -> i32 {
        let cfg = self.config;
        let mut total = 0i32;
        let mut word_count = 0;
        let mut done_count = 0;
        let mut prev_word_score = 0i32;
        let mut prev_word_done = false;
        let mut prev_char_1 = false;
        let mut prev_char_digit = false;

        for word in words.iter().filter(|w| !w.part_of_combo) {
            let word_done = fixspace_thinks_word_done(word, cfg);
            word_count += 1;
            if word.tess_failed {
                total += prev_word_score;
                if prev_word_done {
                    done_count += 1;
                }
                prev_word_score = 0;
                prev_char_1 = false;
                prev_char_digit = false;
                prev_word_done = false;
                continue;
            }

            let word_len = word.reject_map.len();
            let first = first_unichar(word);
            let vetoed = (prev_char_1 && self.digit_or_numeric_punct(word, 0))
                || (prev_char_digit
                    && ((word_done && first == "1")
                        || (!word_done && !first.is_empty() && CONFLICT_SET_I_L_1.contains(first))));
            let mut ok_so_far = false;
            if !vetoed {
                total += prev_word_score;
                if prev_word_done {
                    done_count += 1;
                }
                ok_so_far = word_done;
            }

            if ok_so_far
                && (!cfg.test_uniform_wd_spacing
                    || permuter_of(word) == Permuter::Number
                    || uniformly_spaced(word, row, cfg))
            {
                prev_word_done = true;
                prev_word_score = word_len as i32;
            } else {
                prev_word_done = false;
                prev_word_score = 0;
            }

            if cfg.prefer_joined_1s {
                total += joined_bonus(word, word_len, |u| u == "1");
            }
            if cfg.prefer_joined_punct {
                total += joined_bonus(word, word_len, |u| !u.is_empty() && JOINED_PUNCT_CHARS.contains(u));
            }

            prev_char_digit = word_len > 0 && self.digit_or_numeric_punct(word, word_len - 1);
            let last = last_unichar(word);
            prev_char_1 = (word_done && last == "1")
                || (!word_done && !last.is_empty() && CONFLICT_SET_I_L_1.contains(last));
        }
        total += prev_word_score;
        if prev_word_done {
            done_count += 1;
        }
        if done_count == word_count {
            PERFECT_WERDS
        } else {
            total
        }
    }

    /// Splits a noisy fixed-pitch word in place. Returns the index of the
    /// last word that replaced it.
    pub fn fix_sp_fp_word(&mut self, words: &mut Vec<WordResult>, index: usize, row: &RowContext) -> usize {
        let cfg = self.config;
        let word = &words[index];
        if !cfg.check_for_fp_noise_space
            || word.word.flags.rep_char
            || word.combination
            || word.part_of_combo
            || !word.word.flags.dont_chop
        {
            return index;
        }
        let bln = BlnTransform::for_row(row);
        if noise::worst_noise_blob(word, &bln, cfg).is_none() {
            return index;
        }
        debug!(word = %word.best_string(), "fixed-pitch noise repair");

        let mut sub = vec![words.remove(index)];
        sub[0].word.rej_blobs.sort_by_key(|b| b.bounding_box().left);
        self.fix_noisy_space_list(&mut sub, row);
        let n = sub.len();
        words.splice(index..index, sub);
        index + n.saturating_sub(1)
    }

    /// Repeatedly removes the noisiest glyph and keeps the best split.
    pub fn fix_noisy_space_list(&mut self, best: &mut Vec<WordResult>, row: &RowContext) {
        let bln = BlnTransform::for_row(row);
        let mut best_score = self.fp_eval_word_spacing(best, row);
        let mut improved = false;
        dump_words(best, best_score, "EXTRACTED", improved);

        let mut current: Vec<WordResult> = best
            .iter()
            .take(1)
            .map(|w| {
                let mut copy = w.clone();
                copy.combination = false;
                copy
            })
            .collect();
        noise::break_noisiest_blob_word(&mut current, &bln, self.config);

        while best_score != PERFECT_WERDS && !current.is_empty() {
            self.match_current_words(&mut current, row);
            let score = self.fp_eval_word_spacing(&current, row);
            dump_words(&current, score, "TESTED", improved);
            if score > best_score {
                *best = current.clone();
                best_score = score;
                improved = true;
            }
            if score < PERFECT_WERDS {
                noise::break_noisiest_blob_word(&mut current, &bln, self.config);
            }
        }
        dump_words(best, best_score, "RETURNED", improved);
    }

    /// Characters of trusted words that are accepted and not likely noise,
    /// minus one for each space or speck.
    pub fn fp_eval_word_spacing(&self, words: &[WordResult], row: &RowContext) -> i32 {
        if !self.config.fp_eval {
            return self.eval_word_spacing(words, row);
        }
        let bln = BlnTransform::for_row(row);
        let small = noise::small_limit(self.config);
        let mut score = 0i32;
        for word in words {
            let Some(best) = &word.best_choice else {
                continue;
            };
            let trusted = word.done
                || word.tess_accepted
                || best.permuter.is_dawg()
                || self.dict.safe_dict_word(best);
            if !trusted {
                continue;
            }
            for (i, (u, blob)) in best.unichars.iter().zip(&word.word.blobs).enumerate() {
                if u == " " || blob_noise_score(blob, &bln, self.config.noise_score_fixing) < small {
                    score -= 1;
                } else if word.reject_map.accepted(i) {
                    score += 1;
                }
            }
        }
        score.max(0)
    }
}
