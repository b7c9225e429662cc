use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Index into a [`UnicharSet`].
pub type ClassId = usize;

/// Reserved id of the noise / null class.
pub const NO_CLASS: ClassId = 0;

const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnicharProperties {
    pub alpha: bool,
    pub digit: bool,
    pub lower: bool,
    pub upper: bool,
    pub punctuation: bool,
}

/// Piece of a character split across several blobs, written `|c|i|n|`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CharFragment {
    pub unichar: String,
    pub pos: usize,
    pub total: usize,
}

impl CharFragment {
    pub fn parse(s: &str) -> Option<Self> {
        let inner = s.strip_prefix('|')?.strip_suffix('|')?;
        let mut parts = inner.rsplitn(3, '|');
        let total = parts.next()?.parse().ok()?;
        let pos = parts.next()?.parse().ok()?;
        let unichar = parts.next()?.to_string();
        if unichar.is_empty() || total < 2 || pos >= total {
            return None;
        }
        Some(Self { unichar, pos, total })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnicharSet {
    unichars: Vec<String>,
    properties: Vec<UnicharProperties>,
    #[serde(skip)]
    ids: HashMap<String, ClassId>,
}

impl Default for UnicharSet {
    fn default() -> Self {
        Self::new()
    }
}

impl UnicharSet {
    /// Creates a set holding only the space / noise entry.
    pub fn new() -> Self {
        let mut set = Self {
            unichars: Vec::new(),
            properties: Vec::new(),
            ids: HashMap::new(),
        };
        set.insert(" ");
        set
    }

    pub fn from_unichars<I, S>(unichars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for u in unichars {
            set.insert(u.as_ref());
        }
        set
    }

    /// One unichar per line; blank lines are ignored.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let reader = BufReader::new(File::open(path)?);
        let mut set = Self::new();
        for line in reader.lines() {
            let line = line?;
            let entry = line.trim_end_matches(['\r', '\n']);
            if !entry.is_empty() {
                set.insert(entry);
            }
        }
        Ok(set)
    }

    /// Returns the id of `unichar`, adding it if needed.
    pub fn insert(&mut self, unichar: &str) -> ClassId {
        if let Some(&id) = self.ids.get(unichar) {
            return id;
        }
        let id = self.unichars.len();
        self.unichars.push(unichar.to_string());
        self.properties.push(derive_properties(unichar));
        self.ids.insert(unichar.to_string(), id);
        id
    }

    /// Rebuilds the reverse index after deserialization.
    pub fn reindex(&mut self) {
        self.ids = self
            .unichars
            .iter()
            .enumerate()
            .map(|(id, u)| (u.clone(), id))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.unichars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unichars.is_empty()
    }

    pub fn id_of(&self, unichar: &str) -> Option<ClassId> {
        self.ids.get(unichar).copied()
    }

    pub fn unichar(&self, id: ClassId) -> Result<&str, EngineError> {
        self.unichars
            .get(id)
            .map(String::as_str)
            .ok_or(EngineError::UnknownUnichar(id))
    }

    /// Like [`unichar`](Self::unichar) but maps unknown ids to the noise entry.
    pub fn unichar_or_space(&self, id: ClassId) -> &str {
        self.unichars.get(id).map(String::as_str).unwrap_or(" ")
    }

    pub fn properties(&self, id: ClassId) -> UnicharProperties {
        self.properties.get(id).cloned().unwrap_or_default()
    }

    pub fn is_alpha(&self, id: ClassId) -> bool {
        self.properties(id).alpha
    }

    pub fn is_digit(&self, id: ClassId) -> bool {
        self.properties(id).digit
    }

    pub fn is_punctuation(&self, id: ClassId) -> bool {
        self.properties(id).punctuation
    }

    pub fn is_fragment(&self, id: ClassId) -> bool {
        self.unichars
            .get(id)
            .is_some_and(|u| CharFragment::parse(u).is_some())
    }
}

fn derive_properties(unichar: &str) -> UnicharProperties {
    if CharFragment::parse(unichar).is_some() {
        return UnicharProperties::default();
    }
    UnicharProperties {
        alpha: is_alpha(unichar),
        digit: is_digit(unichar),
        lower: is_lower(unichar),
        upper: is_upper(unichar),
        punctuation: is_punctuation(unichar),
    }
}

fn first_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

pub fn is_alpha(s: &str) -> bool {
    first_char(s).is_some_and(char::is_alphabetic)
}

pub fn is_digit(s: &str) -> bool {
    first_char(s).is_some_and(|c| c.is_ascii_digit())
}

pub fn is_lower(s: &str) -> bool {
    first_char(s).is_some_and(char::is_lowercase)
}

pub fn is_upper(s: &str) -> bool {
    first_char(s).is_some_and(char::is_uppercase)
}

pub fn is_alnum(s: &str) -> bool {
    is_alpha(s) || is_digit(s)
}

pub fn is_punctuation(s: &str) -> bool {
    first_char(s).is_some_and(|c| PUNCTUATION.contains(c))
}
