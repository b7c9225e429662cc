//! Outline → feature conversion.
//!
//! Two reference frames are produced for every blob:
//!
//! - **baseline-normalized**: the row baseline sits at y = 0.25 and the row
//!   x-height spans 0.5 units; x is centred on the blob. Used by the adapted
//!   templates, which assume a consistent document style.
//! - **character-normalized**: the blob's own centroid is moved to (0.5, 0.5)
//!   and its second moments are scaled to a fixed size. Used by the
//!   pre-trained templates.
//!
//! Directions are stored as a fraction of a full turn in `[0, 1)`.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::blob::{Blob, RowContext};

/// Default length of one pico feature, in normalized units.
pub const PICO_FEATURE_LENGTH: f32 = 0.05;
/// Blobs producing more pico features than this are unclassifiable.
pub const MAX_PICO_FEATURES: usize = 512;

const CHAR_NORM_SPREAD: f32 = 0.15;
const MIN_MOMENT: f32 = 0.01;

/// Short fixed-length piece of an outline.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PicoFeature {
    pub x: f32,
    pub y: f32,
    pub dir: f32,
}

/// One whole outline edge.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutlineFeature {
    pub x: f32,
    pub y: f32,
    pub dir: f32,
    pub length: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub pico: Vec<PicoFeature>,
    pub outline: Vec<OutlineFeature>,
}

/// Shape statistics of a blob in the baseline frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CharNormStats {
    /// Centroid height above the baseline.
    pub y: f32,
    /// Total outline length.
    pub length: f32,
    pub rx: f32,
    pub ry: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlobFeatures {
    pub baseline: FeatureSet,
    pub char_norm: FeatureSet,
    pub stats: CharNormStats,
    /// Outline length measured in baseline pico features.
    pub blob_length: usize,
}

/// Pure function from a glyph to its features. `None` means the glyph cannot
/// be classified (no usable outline, or an implausible amount of detail).
pub trait FeatureExtractor {
    fn extract(&self, blob: &Blob, row: &RowContext) -> Option<BlobFeatures>;
}

#[derive(Clone, Debug)]
pub struct OutlineFeatureExtractor {
    pub pico_length: f32,
    pub max_features: usize,
}

impl Default for OutlineFeatureExtractor {
    fn default() -> Self {
        Self {
            pico_length: PICO_FEATURE_LENGTH,
            max_features: MAX_PICO_FEATURES,
        }
    }
}

type Edge = ((f32, f32), (f32, f32));

impl OutlineFeatureExtractor {
    pub fn new(pico_length: f32) -> Self {
        Self {
            pico_length,
            ..Self::default()
        }
    }

    fn baseline_edges(blob: &Blob, row: &RowContext) -> Vec<Edge> {
        let bbox = blob.bounding_box();
        let cx = (bbox.left + bbox.right) as f32 / 2.0;
        let x_height = if row.x_height > 0.0 { row.x_height } else { 1.0 };
        let scale = 0.5 / x_height;
        let map = |x: i32, y: i32| {
            (
                (x as f32 - cx) * scale + 0.5,
                (y as f32 - row.baseline) * scale + 0.25,
            )
        };
        blob.outlines
            .iter()
            .flat_map(|o| o.edges())
            .map(|(a, b)| (map(a.x, a.y), map(b.x, b.y)))
            .collect()
    }

    /// Stops once more than `limit` pico features have been produced; the
    /// caller treats that as too much detail.
    fn features_for(&self, edges: &[Edge], limit: usize) -> FeatureSet {
        let mut set = FeatureSet::default();
        for &((x0, y0), (x1, y1)) in edges {
            if set.pico.len() > limit {
                break;
            }
            let dx = x1 - x0;
            let dy = y1 - y0;
            let length = (dx * dx + dy * dy).sqrt();
            if length < 1e-6 {
                continue;
            }
            let dir = direction(dx, dy);
            set.outline.push(OutlineFeature {
                x: (x0 + x1) / 2.0,
                y: (y0 + y1) / 2.0,
                dir,
                length,
            });
            let pieces = (length / self.pico_length).round().max(1.0) as usize;
            for k in 0..pieces.min(limit + 1 - set.pico.len()) {
                let t = (k as f32 + 0.5) / pieces as f32;
                set.pico.push(PicoFeature {
                    x: x0 + dx * t,
                    y: y0 + dy * t,
                    dir,
                });
            }
        }
        set
    }
}

fn direction(dx: f32, dy: f32) -> f32 {
    let turn = dy.atan2(dx) / (2.0 * PI);
    let wrapped = turn.rem_euclid(1.0);
    if wrapped >= 1.0 { 0.0 } else { wrapped }
}

/// Length-weighted centroid and standard deviations of a set of edges.
fn moments(edges: &[Edge]) -> (f32, f32, f32, f32, f32) {
    let mut total = 0.0f32;
    let mut sx = 0.0f32;
    let mut sy = 0.0f32;
    for &((x0, y0), (x1, y1)) in edges {
        let l = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
        total += l;
        sx += l * (x0 + x1) / 2.0;
        sy += l * (y0 + y1) / 2.0;
    }
    if total <= 0.0 {
        return (0.0, 0.0, 0.0, 0.0, 0.0);
    }
    let (xm, ym) = (sx / total, sy / total);
    let mut vx = 0.0f32;
    let mut vy = 0.0f32;
    for &((x0, y0), (x1, y1)) in edges {
        let l = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
        vx += l * ((x0 + x1) / 2.0 - xm).powi(2);
        vy += l * ((y0 + y1) / 2.0 - ym).powi(2);
    }
    (xm, ym, (vx / total).sqrt(), (vy / total).sqrt(), total)
}

impl FeatureExtractor for OutlineFeatureExtractor {
    fn extract(&self, blob: &Blob, row: &RowContext) -> Option<BlobFeatures> {
        let bl_edges = Self::baseline_edges(blob, row);
        let baseline = self.features_for(&bl_edges, self.max_features);
        if baseline.pico.is_empty() || baseline.pico.len() > self.max_features {
            return None;
        }

        let (xm, ym, rx, ry, length) = moments(&bl_edges);
        let scale = CHAR_NORM_SPREAD / rx.max(ry).max(MIN_MOMENT);
        let to_cn = |(x, y): (f32, f32)| (0.5 + (x - xm) * scale, 0.5 + (y - ym) * scale);
        let cn_edges: Vec<Edge> = bl_edges.iter().map(|&(a, b)| (to_cn(a), to_cn(b))).collect();
        let char_norm = self.features_for(&cn_edges, self.max_features);

        Some(BlobFeatures {
            blob_length: baseline.pico.len(),
            baseline,
            char_norm,
            stats: CharNormStats {
                y: ym - 0.25,
                length,
                rx,
                ry,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::Outline;
    use crate::geometry::Point;

    fn row() -> RowContext {
        RowContext::new(0.0, 20.0, 10.0, 2.0)
    }

    #[test]
    fn degenerate_outline_is_unclassifiable() {
        let blob = Blob::new(vec![Outline::new(vec![Point::new(3, 3)])]);
        assert!(OutlineFeatureExtractor::default().extract(&blob, &row()).is_none());
        assert!(OutlineFeatureExtractor::default().extract(&Blob::default(), &row()).is_none());
    }

    #[test]
    fn square_has_four_directions() {
        let blob = Blob::new(vec![Outline::rect(0, 0, 20, 20)]);
        let f = OutlineFeatureExtractor::default().extract(&blob, &row()).unwrap();
        assert_eq!(f.baseline.outline.len(), 4);
        let dirs: Vec<f32> = f.baseline.outline.iter().map(|o| o.dir).collect();
        assert!((dirs[0] - 0.0).abs() < 1e-5);
        assert!((dirs[1] - 0.25).abs() < 1e-5);
        assert!((dirs[2] - 0.5).abs() < 1e-5);
        assert!((dirs[3] - 0.75).abs() < 1e-5);
        // each side is half a unit long: ten picos per side
        assert_eq!(f.blob_length, 40);
    }

    #[test]
    fn tiny_x_height_stops_at_the_feature_cap() {
        let ex = OutlineFeatureExtractor::default();
        let blob = Blob::new(vec![Outline::rect(0, 0, 20, 20)]);
        let tiny = RowContext::new(0.0, 0.001, 10.0, 2.0);
        assert!(ex.extract(&blob, &tiny).is_none());

        let edges = OutlineFeatureExtractor::baseline_edges(&blob, &tiny);
        let set = ex.features_for(&edges, ex.max_features);
        assert_eq!(set.pico.len(), ex.max_features + 1);
        assert_eq!(set.outline.len(), 1);
    }

    #[test]
    fn baseline_frame_places_baseline_at_quarter() {
        let blob = Blob::new(vec![Outline::rect(0, 0, 20, 20)]);
        let f = OutlineFeatureExtractor::default().extract(&blob, &row()).unwrap();
        let bottom = &f.baseline.outline[0];
        assert!((bottom.y - 0.25).abs() < 1e-5);
        assert!((bottom.x - 0.5).abs() < 1e-5);
        assert!((f.stats.y - 0.25).abs() < 1e-5);
    }

    #[test]
    fn char_norm_frame_is_scale_invariant() {
        let ex = OutlineFeatureExtractor::default();
        let small = ex.extract(&Blob::new(vec![Outline::rect(0, 0, 10, 10)]), &row()).unwrap();
        let large = ex.extract(&Blob::new(vec![Outline::rect(0, 0, 30, 30)]), &row()).unwrap();
        for (a, b) in small.char_norm.outline.iter().zip(large.char_norm.outline.iter()) {
            assert!((a.x - b.x).abs() < 1e-4);
            assert!((a.y - b.y).abs() < 1e-4);
            assert!((a.length - b.length).abs() < 1e-4);
        }
    }
}
