//! Noise scoring for fixed-pitch words: finds specks that were glued into
//! a word where a space should have been, and splits the word there.

use tracing::trace;

use crate::blob::Blob;
use crate::geometry::{BlnTransform, BLN_BASELINE_OFFSET, BLN_X_HEIGHT};
use crate::types::FixSpaceConfig;
use crate::word::{Word, WordResult};

/// Below this (normalized) size a glyph is probably noise.
pub fn small_limit(cfg: &FixSpaceConfig) -> f32 {
    BLN_X_HEIGHT * cfg.small_outlines_size
}

/// Score given to accepted glyphs: certainly not noise.
pub fn non_noise_limit() -> f32 {
    BLN_X_HEIGHT * 0.8
}

/// Largest outline dimension in the normalized frame. Lots of outlines
/// double it; sitting far above or below the text halves it.
pub fn blob_noise_score(blob: &Blob, bln: &BlnTransform, noise_score_fixing: bool) -> f32 {
    let mut largest = blob
        .outlines
        .iter()
        .map(|o| {
            let b = o.bounding_box();
            bln.length(b.width().max(b.height()) as f32)
        })
        .fold(0.0f32, f32::max);

    if noise_score_fixing {
        if blob.num_outlines() > 5 {
            largest *= 2.0;
        }
        let b = blob.bounding_box();
        if bln.y(b.bottom) > BLN_BASELINE_OFFSET * 4.0 || bln.y(b.top) < BLN_BASELINE_OFFSET / 2.0 {
            largest /= 2.0;
        }
    }
    largest
}

/// Index and score of the noisiest glyph that has at least
/// `non_noise_limit` real glyphs on either side, if any scores below the
/// small-outline limit.
pub fn worst_noise_blob(word: &WordResult, bln: &BlnTransform, cfg: &FixSpaceConfig) -> Option<(usize, f32)> {
    let blobs = &word.word.blobs;
    if blobs.len() < 5 {
        return None;
    }
    let non_noise = non_noise_limit();
    let scores: Vec<f32> = blobs
        .iter()
        .enumerate()
        .map(|(i, b)| {
            if word.reject_map.accepted(i) {
                non_noise
            } else {
                blob_noise_score(b, bln, cfg.noise_score_fixing)
            }
        })
        .collect();
    trace!(?scores, "noise metrics");

    let mut count = 0;
    let mut min_blob = 0;
    while min_blob < scores.len() && count < cfg.non_noise_limit {
        if scores[min_blob] >= non_noise {
            count += 1;
        }
        min_blob += 1;
    }
    if count < cfg.non_noise_limit {
        return None;
    }

    count = 0;
    let mut max_blob = scores.len() as isize - 1;
    while max_blob >= 0 && count < cfg.non_noise_limit {
        if scores[max_blob as usize] >= non_noise {
            count += 1;
        }
        max_blob -= 1;
    }
    if count < cfg.non_noise_limit || (min_blob as isize) > max_blob {
        return None;
    }

    let mut worst: Option<(usize, f32)> = None;
    let mut worst_score = small_limit(cfg);
    for (i, &s) in scores.iter().enumerate().take(max_blob as usize + 1).skip(min_blob) {
        if s < worst_score {
            worst_score = s;
            worst = Some((i, s));
        }
    }
    worst
}

/// Splits the word holding the noisiest glyph into two, dropping the glyph.
/// Clears the list when no word has a candidate.
pub fn break_noisiest_blob_word(words: &mut Vec<WordResult>, bln: &BlnTransform, cfg: &FixSpaceConfig) {
    let mut worst: Option<(usize, usize, f32)> = None;
    for (w, word) in words.iter().enumerate() {
        if let Some((blob, score)) = worst_noise_blob(word, bln, cfg) {
            if worst.map_or(true, |(_, _, s)| s > score) {
                worst = Some((w, blob, score));
            }
        }
    }
    let Some((w, blob_index, _)) = worst else {
        words.clear();
        return;
    };

    let word = &mut words[w];
    let front: Vec<Blob> = word.word.blobs.drain(..blob_index).collect();
    let noise = word.word.blobs.remove(0);
    let noise_left = noise.bounding_box().left;

    let mut flags = word.word.flags;
    flags.eol = false;
    let mut new_word = Word {
        blobs: front,
        rej_blobs: Vec::new(),
        flags,
        blanks: word.word.blanks,
    };
    word.word.flags.bol = false;
    word.word.blanks = 1;

    // rejected blobs are kept sorted by left edge
    let split = word
        .word
        .rej_blobs
        .iter()
        .position(|b| b.bounding_box().left >= noise_left)
        .unwrap_or(word.word.rej_blobs.len());
    new_word.rej_blobs = word.word.rej_blobs.drain(..split).collect();
    word.reset_outputs();

    trace!(word = w, blob = blob_index, "broke noisy word");
    words.insert(w, WordResult::new(new_word));
}
