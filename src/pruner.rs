use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::features::PicoFeature;
use crate::templates::Prototype;
use crate::unicharset::ClassId;

type Bucket = (u8, u8, u8);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrunerCandidate {
    pub class_id: ClassId,
    /// Fraction of features that landed in a bucket of the class.
    pub score: f32,
}

/// Coarse (x, y, direction) grid that maps each cell to the classes with a
/// proto passing near it. Narrows classification to a few candidates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassPruner {
    buckets: u8,
    index: BTreeMap<Bucket, BTreeSet<ClassId>>,
}

impl ClassPruner {
    pub fn new(buckets: u8) -> Self {
        Self {
            buckets: buckets.max(2),
            index: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn quantize(&self, v: f32) -> u8 {
        let n = self.buckets as f32;
        (v * n).floor().clamp(0.0, n - 1.0) as u8
    }

    fn quantize_dir(&self, dir: f32) -> u8 {
        let n = self.buckets as f32;
        ((dir.rem_euclid(1.0) * n).floor() as u32 % self.buckets as u32) as u8
    }

    pub fn add_proto(&mut self, class_id: ClassId, proto: &Prototype) {
        let n = self.buckets as i32;
        let step = 0.5 / self.buckets as f32;
        let samples = ((proto.length / step).ceil() as usize).max(1);
        let (ux, uy) = proto.direction();
        let qd = self.quantize_dir(proto.angle) as i32;
        let mut cells = BTreeSet::new();
        for k in 0..=samples {
            let offset = k as f32 / samples as f32 * proto.length - proto.length / 2.0;
            let qx = self.quantize(proto.x + ux * offset) as i32;
            let qy = self.quantize(proto.y + uy * offset) as i32;
            for dx in -1..=1 {
                for dy in -1..=1 {
                    for dd in -1..=1 {
                        let x = (qx + dx).clamp(0, n - 1) as u8;
                        let y = (qy + dy).clamp(0, n - 1) as u8;
                        let d = (qd + dd).rem_euclid(n) as u8;
                        cells.insert((x, y, d));
                    }
                }
            }
        }
        for cell in cells {
            self.index.entry(cell).or_default().insert(class_id);
        }
    }

    /// Ranks the indexed classes by how many features fall into their
    /// cells, keeping those within `keep_ratio` of the best and at most
    /// `max_classes`. Best candidates first.
    pub fn prune(&self, features: &[PicoFeature], keep_ratio: f32, max_classes: usize) -> Vec<PrunerCandidate> {
        if features.is_empty() {
            return Vec::new();
        }
        let mut hits: BTreeMap<ClassId, u32> = BTreeMap::new();
        for f in features {
            let cell = (self.quantize(f.x), self.quantize(f.y), self.quantize_dir(f.dir));
            if let Some(classes) = self.index.get(&cell) {
                for &c in classes {
                    *hits.entry(c).or_insert(0) += 1;
                }
            }
        }
        let nf = features.len() as f32;
        let best = hits.values().copied().max().unwrap_or(0) as f32 / nf;
        let mut candidates: Vec<PrunerCandidate> = hits
            .into_iter()
            .map(|(class_id, h)| PrunerCandidate {
                class_id,
                score: h as f32 / nf,
            })
            .filter(|c| c.score > 0.0 && c.score >= best * keep_ratio)
            .collect();
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.class_id.cmp(&b.class_id)));
        candidates.truncate(max_classes);
        candidates
    }
}
