use serde::{Deserialize, Serialize};

use crate::geometry::{BoundingBox, Point};

/// Closed polygon; the last point connects back to the first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    pub points: Vec<Point>,
}

impl Outline {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Axis-aligned rectangle traced counter-clockwise from the bottom-left.
    pub fn rect(left: i32, bottom: i32, right: i32, top: i32) -> Self {
        Self::new(vec![
            Point::new(left, bottom),
            Point::new(right, bottom),
            Point::new(right, top),
            Point::new(left, top),
        ])
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut b = BoundingBox::empty();
        for &p in &self.points {
            b.include_point(p);
        }
        b
    }

    /// Iterates the edges of the closed polygon.
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }
}

/// One connected shape, candidate for a single character.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub outlines: Vec<Outline>,
}

impl Blob {
    pub fn new(outlines: Vec<Outline>) -> Self {
        Self { outlines }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.outlines
            .iter()
            .fold(BoundingBox::empty(), |acc, o| acc.union(&o.bounding_box()))
    }

    pub fn num_outlines(&self) -> usize {
        self.outlines.len()
    }
}

/// Per-row normalization reference, in image pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowContext {
    pub baseline: f32,
    pub x_height: f32,
    /// Typical inter-word space.
    pub space: f32,
    /// Typical inter-character gap.
    pub kern: f32,
}

impl RowContext {
    pub fn new(baseline: f32, x_height: f32, space: f32, kern: f32) -> Self {
        Self { baseline, x_height, space, kern }
    }

    /// Largest gap (pixels) that is still clearly not a space.
    pub fn max_non_space(&self) -> f32 {
        (self.space + 3.0 * self.kern) / 4.0
    }
}

impl Default for RowContext {
    fn default() -> Self {
        Self::new(0.0, 20.0, 10.0, 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_box_spans_all_outlines() {
        let blob = Blob::new(vec![Outline::rect(0, 0, 2, 10), Outline::rect(0, 13, 2, 15)]);
        assert_eq!(blob.bounding_box(), BoundingBox::new(0, 0, 2, 15));
        assert_eq!(blob.num_outlines(), 2);
    }

    #[test]
    fn rect_outline_closes() {
        let o = Outline::rect(0, 0, 4, 4);
        let edges: Vec<_> = o.edges().collect();
        assert_eq!(edges.len(), 4);
        assert_eq!(edges[3].1, Point::new(0, 0));
    }
}
