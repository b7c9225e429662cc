use serde::{Deserialize, Serialize};

use crate::blob::RowContext;
use crate::word::WordResult;

/// One text line: its normalization context and its words in reading order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Row {
    pub context: RowContext,
    pub words: Vec<WordResult>,
}

impl Row {
    pub fn new(context: RowContext, words: Vec<WordResult>) -> Self {
        Self { context, words }
    }

    pub fn text(&self) -> String {
        self.words
            .iter()
            .filter(|w| !w.part_of_combo)
            .map(WordResult::best_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Block {
    pub rows: Vec<Row>,
}

/// Segmented page as produced by layout analysis.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Page {
    pub blocks: Vec<Block>,
}

impl Page {
    pub fn word_count(&self) -> usize {
        self.rows().map(|r| r.words.len()).sum()
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.blocks.iter().flat_map(|b| b.rows.iter())
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut Row> {
        self.blocks.iter_mut().flat_map(|b| b.rows.iter_mut())
    }

    pub fn text(&self) -> String {
        self.rows().map(Row::text).collect::<Vec<_>>().join("\n")
    }
}
