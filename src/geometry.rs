use serde::{Deserialize, Serialize};

/// x-height of a word after baseline normalization.
pub const BLN_X_HEIGHT: f32 = 128.0;
/// Baseline position after baseline normalization.
pub const BLN_BASELINE_OFFSET: f32 = 64.0;

/// Integer image point. y grows upward, as in the page model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box; `right`/`top` are inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
    pub top: i32,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    pub fn new(left: i32, bottom: i32, right: i32, top: i32) -> Self {
        Self { left, bottom, right, top }
    }

    pub fn empty() -> Self {
        Self {
            left: i32::MAX,
            bottom: i32::MAX,
            right: i32::MIN,
            top: i32::MIN,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left > self.right || self.bottom > self.top
    }

    pub fn width(&self) -> i32 {
        if self.is_empty() { 0 } else { self.right - self.left }
    }

    pub fn height(&self) -> i32 {
        if self.is_empty() { 0 } else { self.top - self.bottom }
    }

    pub fn include_point(&mut self, p: Point) {
        self.left = self.left.min(p.x);
        self.right = self.right.max(p.x);
        self.bottom = self.bottom.min(p.y);
        self.top = self.top.max(p.y);
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        BoundingBox {
            left: self.left.min(other.left),
            bottom: self.bottom.min(other.bottom),
            right: self.right.max(other.right),
            top: self.top.max(other.top),
        }
    }
}

/// Maps image coordinates of a row into the baseline-normalized frame
/// used by the spacing heuristics (x-height = 128, baseline = 64).
#[derive(Clone, Copy, Debug)]
pub struct BlnTransform {
    baseline: f32,
    scale: f32,
}

impl BlnTransform {
    pub fn for_row(row: &crate::blob::RowContext) -> Self {
        let x_height = if row.x_height > 0.0 { row.x_height } else { 1.0 };
        Self {
            baseline: row.baseline,
            scale: BLN_X_HEIGHT / x_height,
        }
    }

    pub fn length(&self, pixels: f32) -> f32 {
        pixels * self.scale
    }

    pub fn y(&self, y: i32) -> f32 {
        (y as f32 - self.baseline) * self.scale + BLN_BASELINE_OFFSET
    }
}
