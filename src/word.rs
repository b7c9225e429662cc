use serde::{Deserialize, Serialize};

use crate::blob::Blob;
use crate::dict::Permuter;
use crate::geometry::BoundingBox;
use crate::results::BlobChoice;

/// One candidate string for a word, one unichar per blob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WordChoice {
    pub unichars: Vec<String>,
    pub permuter: Permuter,
    pub rating: f32,
    pub certainty: f32,
    /// Multiplier the language model applied to the raw rating.
    pub adjust_factor: f32,
}

impl WordChoice {
    pub fn new(unichars: Vec<String>, permuter: Permuter) -> Self {
        Self {
            unichars,
            permuter,
            rating: 0.0,
            certainty: 0.0,
            adjust_factor: 1.0,
        }
    }

    /// Splits `text` into single-character unichars.
    pub fn from_text(text: &str, permuter: Permuter) -> Self {
        Self::new(text.chars().map(String::from).collect(), permuter)
    }

    pub fn len(&self) -> usize {
        self.unichars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unichars.is_empty()
    }

    pub fn string(&self) -> String {
        self.unichars.concat()
    }

    pub fn unichar(&self, index: usize) -> Option<&str> {
        self.unichars.get(index).map(String::as_str)
    }

    pub fn contains(&self, unichar: &str) -> bool {
        self.unichars.iter().any(|u| u == unichar)
    }
}

/// Per-character accept flags of a recognized word.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectMap(Vec<bool>);

impl RejectMap {
    pub fn all_accepted(len: usize) -> Self {
        Self(vec![true; len])
    }

    pub fn from_flags(flags: Vec<bool>) -> Self {
        Self(flags)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Out-of-range positions count as rejected.
    pub fn accepted(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    pub fn reject(&mut self, index: usize) {
        if let Some(f) = self.0.get_mut(index) {
            *f = false;
        }
    }

    pub fn reject_count(&self) -> usize {
        self.0.iter().filter(|a| !**a).count()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordFlags {
    /// Preceded by a space the segmenter was unsure of.
    pub fuzzy_sp: bool,
    /// Preceded by a gap that is probably, but not surely, not a space.
    pub fuzzy_non: bool,
    pub bol: bool,
    pub eol: bool,
    /// Fixed-pitch word that must not be chopped.
    pub dont_chop: bool,
    pub rep_char: bool,
}

/// Segmented word: its glyphs in reading order plus the glyphs rejected as
/// noise during segmentation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub blobs: Vec<Blob>,
    pub rej_blobs: Vec<Blob>,
    pub flags: WordFlags,
    pub blanks: u8,
}

impl Word {
    pub fn new(blobs: Vec<Blob>, flags: WordFlags) -> Self {
        Self {
            blobs,
            rej_blobs: Vec::new(),
            flags,
            blanks: 1,
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.blobs
            .iter()
            .fold(BoundingBox::empty(), |acc, b| acc.union(&b.bounding_box()))
    }

    /// Moves all glyphs of `other` into this word, keeping left-to-right order.
    pub fn join_on(&mut self, other: Word) {
        self.blobs.extend(other.blobs);
        self.rej_blobs.extend(other.rej_blobs);
        self.sort_blobs();
    }

    /// Appends copies of the glyphs of `other`.
    pub fn copy_on(&mut self, other: &Word) {
        self.blobs.extend(other.blobs.iter().cloned());
        self.rej_blobs.extend(other.rej_blobs.iter().cloned());
        self.sort_blobs();
    }

    pub fn sort_blobs(&mut self) {
        self.blobs.sort_by_key(|b| b.bounding_box().left);
        self.rej_blobs.sort_by_key(|b| b.bounding_box().left);
    }
}

/// A word together with everything recognition produced for it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WordResult {
    pub word: Word,
    /// Context-corrected choice; `None` until the word has been recognized.
    pub best_choice: Option<WordChoice>,
    /// Classifier-only choice.
    pub raw_choice: Option<WordChoice>,
    pub alt_choices: Vec<WordChoice>,
    pub reject_map: RejectMap,
    pub blob_choices: Vec<Vec<BlobChoice>>,
    pub done: bool,
    pub tess_accepted: bool,
    pub tess_failed: bool,
    /// Synthetic merge of adjacent words.
    pub combination: bool,
    /// Merged into a combination elsewhere in the list.
    pub part_of_combo: bool,
}

impl WordResult {
    pub fn new(word: Word) -> Self {
        Self {
            word,
            ..Self::default()
        }
    }

    pub fn is_recognized(&self) -> bool {
        self.best_choice.is_some()
    }

    pub fn best_string(&self) -> String {
        self.best_choice.as_ref().map(WordChoice::string).unwrap_or_default()
    }

    /// Drops every recognition output so the word is classified again.
    pub fn reset_outputs(&mut self) {
        self.done = false;
        self.tess_accepted = false;
        self.tess_failed = false;
        self.best_choice = None;
        self.raw_choice = None;
        self.alt_choices.clear();
        self.reject_map = RejectMap::default();
        self.blob_choices.clear();
    }

    /// New combination word seeded with a copy of `first`'s glyphs.
    pub fn combination_of(first: &WordResult) -> Self {
        Self {
            word: first.word.clone(),
            combination: true,
            ..Self::default()
        }
    }

    pub fn copy_on(&mut self, other: &WordResult) {
        self.word.copy_on(&other.word);
    }
}
