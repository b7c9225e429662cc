//! Word-validity oracle consumed by the learner and the spacing repair.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::unicharset;
use crate::word::{WordChoice, WordResult};

/// How the final string of a word was validated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permuter {
    #[default]
    NoPerm,
    Punc,
    TopChoice,
    LowerCase,
    UpperCase,
    SystemDawg,
    DocDawg,
    UserDawg,
    FreqDawg,
    Number,
    Compound,
}

impl Permuter {
    /// Validated by one of the word lists.
    pub fn is_dawg(self) -> bool {
        matches!(self, Permuter::SystemDawg | Permuter::FreqDawg | Permuter::UserDawg)
    }
}

/// Rating multipliers the word search applies per kind of string.
pub const ADJUST_FACTOR_DICT_WORD: f32 = 1.0;
pub const ADJUST_FACTOR_CASE_BAD: f32 = 1.3125;
pub const ADJUST_FACTOR_NON_WORD: f32 = 1.25;

/// Side-effect free word predicates. The "current best choice" queries
/// read the state the recognizer recorded on the word.
pub trait Dictionary {
    /// `NoPerm` when the word is not in any word list.
    fn valid_word(&self, choice: &WordChoice) -> Permuter;
    fn valid_number(&self, choice: &WordChoice) -> bool;
    fn pure_number(&self, choice: &WordChoice) -> bool;
    fn case_ok(&self, choice: &WordChoice) -> bool;
    /// Number of punctuation marks, or -1 when their placement is implausible.
    fn punctuation_ok(&self, choice: &WordChoice) -> i32;

    fn safe_dict_word(&self, choice: &WordChoice) -> bool {
        !choice.contains(" ") && self.valid_word(choice) != Permuter::NoPerm
    }

    /// Penalty for a choice given its permuter; words from a list with
    /// plausible case and numbers go unpenalized.
    fn adjust_factor(&self, choice: &WordChoice) -> f32 {
        match choice.permuter {
            p if p.is_dawg() && self.case_ok(choice) => ADJUST_FACTOR_DICT_WORD,
            p if p.is_dawg() => ADJUST_FACTOR_CASE_BAD,
            Permuter::Number => ADJUST_FACTOR_DICT_WORD,
            _ => ADJUST_FACTOR_NON_WORD,
        }
    }

    fn current_best_choice_is(&self, word: &WordResult, choice: &WordChoice) -> bool {
        word.best_choice.as_ref().is_some_and(|b| b.unichars == choice.unichars)
    }

    fn current_best_choice_adjust_factor(&self, word: &WordResult) -> f32 {
        word.best_choice.as_ref().map_or(f32::MAX, |b| b.adjust_factor)
    }

    fn alternative_choices_worse_than(&self, word: &WordResult, factor: f32) -> bool {
        word.alt_choices.iter().all(|alt| alt.adjust_factor > factor)
    }
}

/// In-memory word list; every entry validates as a system-dictionary word.
#[derive(Clone, Debug, Default)]
pub struct WordListDictionary {
    words: HashSet<String>,
    numeric_punctuation: String,
}

impl WordListDictionary {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(Into::into).collect(),
            numeric_punctuation: ".,".to_string(),
        }
    }

    /// One word per line.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let reader = BufReader::new(File::open(path)?);
        let mut words = HashSet::new();
        for line in reader.lines() {
            let line = line?;
            let w = line.trim();
            if !w.is_empty() {
                words.insert(w.to_string());
            }
        }
        Ok(Self {
            words,
            numeric_punctuation: ".,".to_string(),
        })
    }

    pub fn with_numeric_punctuation(mut self, punct: &str) -> Self {
        self.numeric_punctuation = punct.to_string();
        self
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Best permuter for a recognized string: word list, then number.
    pub fn permuter_for(&self, choice: &WordChoice) -> Permuter {
        match self.valid_word(choice) {
            Permuter::NoPerm if self.valid_number(choice) => Permuter::Number,
            p => p,
        }
    }

    fn strip_punctuation<'a>(&self, choice: &'a WordChoice) -> &'a [String] {
        let u = &choice.unichars;
        let start = u.iter().position(|c| !unicharset::is_punctuation(c)).unwrap_or(u.len());
        let end = u.iter().rposition(|c| !unicharset::is_punctuation(c)).map_or(start, |e| e + 1);
        &u[start..end.max(start)]
    }
}

impl Dictionary for WordListDictionary {
    fn valid_word(&self, choice: &WordChoice) -> Permuter {
        if choice.is_empty() {
            return Permuter::NoPerm;
        }
        let full = choice.string();
        if self.words.contains(&full) {
            return Permuter::SystemDawg;
        }
        let core: String = self.strip_punctuation(choice).concat();
        if !core.is_empty() && (self.words.contains(&core) || self.words.contains(&core.to_lowercase())) {
            return Permuter::SystemDawg;
        }
        Permuter::NoPerm
    }

    fn valid_number(&self, choice: &WordChoice) -> bool {
        let core = self.strip_punctuation(choice);
        let mut digits = 0;
        for (i, c) in core.iter().enumerate() {
            if unicharset::is_digit(c) {
                digits += 1;
            } else if !(i > 0 && i + 1 < core.len() && self.numeric_punctuation.contains(c.as_str())) {
                return false;
            }
        }
        digits > 0
    }

    fn pure_number(&self, choice: &WordChoice) -> bool {
        !choice.is_empty()
            && choice
                .unichars
                .iter()
                .all(|c| unicharset::is_digit(c) || self.numeric_punctuation.contains(c.as_str()))
    }

    fn case_ok(&self, choice: &WordChoice) -> bool {
        // Lower case may only be followed by lower case; a leading capital
        // or an all-caps word is fine.
        let mut seen_lower = false;
        for c in &choice.unichars {
            if unicharset::is_lower(c) {
                seen_lower = true;
            } else if unicharset::is_upper(c) && seen_lower {
                return false;
            }
        }
        true
    }

    fn punctuation_ok(&self, choice: &WordChoice) -> i32 {
        let u = &choice.unichars;
        let total = u.iter().filter(|c| unicharset::is_punctuation(c)).count() as i32;
        let core = self.strip_punctuation(choice);
        let internal = core.iter().filter(|c| unicharset::is_punctuation(c)).count();
        if internal > 1 {
            return -1;
        }
        total
    }
}
