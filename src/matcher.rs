//! Prototype matcher.
//!
//! Every proto is cut into pico-length pieces. A feature and a piece agree
//! when the feature lies close to the piece's segment with a similar
//! direction; the resulting evidence matrix (pieces × features) is reduced
//! both ways so that unexplained features and unmatched outline both cost.

use ndarray::Array2;
use tracing::trace;

use crate::features::{CharNormStats, PicoFeature};
use crate::templates::{BitVector, ConfigId, IntClass, ProtoId};
use crate::types::MatcherConfig;

/// Outcome of matching one glyph against one class.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntResult {
    /// 0 = perfect, 1 = worst.
    pub rating: f32,
    pub config: ConfigId,
    /// Features that no enabled proto explains at all.
    pub feature_misses: usize,
}

impl IntResult {
    fn worst(feature_misses: usize) -> Self {
        Self {
            rating: 1.0,
            config: 0,
            feature_misses,
        }
    }
}

struct Piece {
    proto_id: ProtoId,
    cx: f32,
    cy: f32,
    ux: f32,
    uy: f32,
    half: f32,
    angle: f32,
}

struct Evidence {
    pieces: Vec<Piece>,
    matrix: Array2<f32>,
}

impl Evidence {
    /// Best evidence of each piece over all features.
    fn piece_best(&self) -> Vec<f32> {
        self.matrix
            .rows()
            .into_iter()
            .map(|row| row.iter().copied().fold(0.0, f32::max))
            .collect()
    }

    fn feature_best<F: Fn(ProtoId) -> bool>(&self, enabled: F) -> Vec<f32> {
        let mut best = vec![0.0f32; self.matrix.ncols()];
        for (p, row) in self.matrix.rows().into_iter().enumerate() {
            if !enabled(self.pieces[p].proto_id) {
                continue;
            }
            for (f, &e) in row.iter().enumerate() {
                if e > best[f] {
                    best[f] = e;
                }
            }
        }
        best
    }
}

#[derive(Clone, Debug)]
pub struct IntegerMatcher {
    position_tolerance: f32,
    angle_tolerance: f32,
    piece_length: f32,
    char_norm_weight: f32,
    adapt_proto_threshold: f32,
    adapt_feature_threshold: f32,
}

impl IntegerMatcher {
    pub fn new(cfg: &MatcherConfig) -> Self {
        Self {
            position_tolerance: cfg.position_tolerance,
            angle_tolerance: cfg.angle_tolerance,
            piece_length: cfg.pico_feature_length,
            char_norm_weight: cfg.char_norm_weight,
            adapt_proto_threshold: cfg.adapt_proto_threshold,
            adapt_feature_threshold: cfg.adapt_feature_threshold,
        }
    }

    fn evidence(&self, class: &IntClass, proto_mask: Option<&BitVector>, features: &[PicoFeature]) -> Evidence {
        let mut pieces = Vec::new();
        for (proto_id, proto) in class.protos.iter().enumerate() {
            if proto_mask.is_some_and(|m| !m.test(proto_id)) {
                continue;
            }
            let (ux, uy) = proto.direction();
            for ((cx, cy), len) in proto.pieces(self.piece_length) {
                pieces.push(Piece {
                    proto_id,
                    cx,
                    cy,
                    ux,
                    uy,
                    half: len / 2.0,
                    angle: proto.angle,
                });
            }
        }
        let pt2 = self.position_tolerance * self.position_tolerance;
        let matrix = Array2::from_shape_fn((pieces.len(), features.len()), |(p, f)| {
            let piece = &pieces[p];
            let feat = &features[f];
            let dx = feat.x - piece.cx;
            let dy = feat.y - piece.cy;
            let along = dx * piece.ux + dy * piece.uy;
            let perp = dx * piece.uy - dy * piece.ux;
            let beyond = (along.abs() - piece.half).max(0.0);
            let mut angle_diff = (feat.dir - piece.angle).abs();
            if angle_diff > 0.5 {
                angle_diff = 1.0 - angle_diff;
            }
            let a = angle_diff / self.angle_tolerance;
            (1.0 - (perp * perp + beyond * beyond) / pt2 - a * a).max(0.0)
        });
        Evidence { pieces, matrix }
    }

    /// Matches `features` against the configurations of `class` enabled by
    /// `config_mask`, using only protos enabled by `proto_mask` (`None`
    /// enables everything). Returns the best configuration.
    pub fn match_class(
        &self,
        class: &IntClass,
        proto_mask: Option<&BitVector>,
        config_mask: Option<&BitVector>,
        features: &[PicoFeature],
        norm_adjust: f32,
    ) -> IntResult {
        if features.is_empty() {
            return IntResult::worst(0);
        }
        let ev = self.evidence(class, proto_mask, features);
        let all = ev.feature_best(|_| true);
        let feature_misses = all.iter().filter(|&&e| e <= 0.0).count();
        let piece_best = ev.piece_best();
        let nf = features.len() as f32;

        let mut best = IntResult::worst(feature_misses);
        let mut found = false;
        for (config_id, mask) in class.configs.iter().enumerate() {
            if config_mask.is_some_and(|m| !m.test(config_id)) {
                continue;
            }
            let enabled = |pid: ProtoId| mask.test(pid);
            let feature_sum: f32 = ev.feature_best(enabled).iter().sum();
            let (proto_sum, n_pieces) = ev
                .pieces
                .iter()
                .zip(piece_best.iter())
                .filter(|(piece, _)| enabled(piece.proto_id))
                .fold((0.0f32, 0usize), |(s, n), (_, &e)| (s + e, n + 1));
            if n_pieces == 0 {
                continue;
            }
            let raw = 1.0 - (feature_sum + proto_sum) / (nf + n_pieces as f32);
            let rating = (raw + norm_adjust * self.char_norm_weight).clamp(0.0, 1.0);
            trace!(config_id, rating, "config match");
            if !found || rating < best.rating {
                best = IntResult {
                    rating,
                    config: config_id,
                    feature_misses,
                };
                found = true;
            }
        }
        best
    }

    /// Protos whose pieces are, on average, well explained by the features.
    pub fn find_good_protos(&self, class: &IntClass, features: &[PicoFeature]) -> Vec<ProtoId> {
        let ev = self.evidence(class, None, features);
        let piece_best = ev.piece_best();
        let mut sums = vec![(0.0f32, 0usize); class.protos.len()];
        for (piece, e) in ev.pieces.iter().zip(piece_best) {
            let s = &mut sums[piece.proto_id];
            s.0 += e;
            s.1 += 1;
        }
        sums.iter()
            .enumerate()
            .filter(|(_, (s, n))| *n > 0 && s / *n as f32 >= self.adapt_proto_threshold)
            .map(|(pid, _)| pid)
            .collect()
    }

    /// Features not explained by any proto in `proto_mask`.
    pub fn find_bad_features(&self, class: &IntClass, proto_mask: &BitVector, features: &[PicoFeature]) -> Vec<usize> {
        let ev = self.evidence(class, Some(proto_mask), features);
        ev.feature_best(|_| true)
            .iter()
            .enumerate()
            .filter(|(_, &e)| e < self.adapt_feature_threshold)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Penalty in `[0, 1]` for a glyph whose size and vertical position differ
/// from the class's training samples.
pub fn char_norm_adjustment(class_stats: Option<&CharNormStats>, blob: &CharNormStats) -> f32 {
    const SCALE: f32 = 0.1;
    let Some(c) = class_stats else {
        return 0.0;
    };
    let dy = (blob.y - c.y) / SCALE;
    let dx = (blob.rx - c.rx) / SCALE;
    let dr = (blob.ry - c.ry) / SCALE;
    (dy * dy + dx * dx + dr * dr).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{Blob, Outline, RowContext};
    use crate::features::{BlobFeatures, FeatureExtractor, OutlineFeatureExtractor};
    use crate::templates::Prototype;

    fn features(outline: Outline) -> BlobFeatures {
        OutlineFeatureExtractor::default()
            .extract(&Blob::new(vec![outline]), &RowContext::default())
            .unwrap()
    }

    fn class_from(f: &BlobFeatures) -> IntClass {
        let mut class = IntClass::default();
        let mut mask = BitVector::new();
        for o in &f.baseline.outline {
            let pid = class.add_proto(Prototype::from_outline_feature(o), 512).unwrap();
            mask.set(pid);
        }
        class.add_config(mask, 32).unwrap();
        class
    }

    #[test]
    fn identical_glyph_matches_perfectly() {
        let f = features(Outline::rect(0, 0, 20, 20));
        let class = class_from(&f);
        let m = IntegerMatcher::new(&MatcherConfig::default());
        let r = m.match_class(&class, None, None, &f.baseline.pico, 0.0);
        assert!(r.rating < 1e-4, "rating {}", r.rating);
        assert_eq!(r.feature_misses, 0);
        assert_eq!(r.config, 0);
    }

    #[test]
    fn different_glyph_rates_worse() {
        let square = features(Outline::rect(0, 0, 20, 20));
        let bar = features(Outline::rect(0, 0, 4, 40));
        let class = class_from(&square);
        let m = IntegerMatcher::new(&MatcherConfig::default());
        let r = m.match_class(&class, None, None, &bar.baseline.pico, 0.0);
        assert!(r.rating > 0.3);
        assert!(r.feature_misses > 0);
    }

    #[test]
    fn norm_adjust_raises_rating() {
        let f = features(Outline::rect(0, 0, 20, 20));
        let class = class_from(&f);
        let m = IntegerMatcher::new(&MatcherConfig::default());
        let r = m.match_class(&class, None, None, &f.baseline.pico, 1.0);
        assert!((r.rating - 0.25).abs() < 1e-3);
    }

    #[test]
    fn disabled_configs_give_worst_rating() {
        let f = features(Outline::rect(0, 0, 20, 20));
        let class = class_from(&f);
        let m = IntegerMatcher::new(&MatcherConfig::default());
        let none = BitVector::new();
        let r = m.match_class(&class, None, Some(&none), &f.baseline.pico, 0.0);
        assert_eq!(r.rating, 1.0);
    }

    #[test]
    fn good_protos_and_bad_features() {
        let square = features(Outline::rect(0, 0, 20, 20));
        let class = class_from(&square);
        let m = IntegerMatcher::new(&MatcherConfig::default());
        assert_eq!(m.find_good_protos(&class, &square.baseline.pico).len(), 4);
        let good: BitVector = m.find_good_protos(&class, &square.baseline.pico).into_iter().collect();
        assert!(m.find_bad_features(&class, &good, &square.baseline.pico).is_empty());
        assert_eq!(
            m.find_bad_features(&class, &BitVector::new(), &square.baseline.pico).len(),
            square.baseline.pico.len()
        );
    }

    #[test]
    fn adjustment_is_bounded() {
        let a = CharNormStats { y: 0.25, length: 2.0, rx: 0.1, ry: 0.1 };
        let b = CharNormStats { y: 0.9, ..a };
        assert_eq!(char_norm_adjustment(Some(&a), &a), 0.0);
        assert_eq!(char_norm_adjustment(Some(&a), &b), 1.0);
        assert_eq!(char_norm_adjustment(None, &b), 0.0);
    }
}
