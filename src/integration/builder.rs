//! Builder for creating Detection records from segmentation output.

use std::collections::BTreeSet;

use crate::tracker::{AREA, CENTROID, Detection, PIXEL_INDICES, Value};

/// Builder for creating `Detection` records attribute by attribute.
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    detection: Detection,
}

impl DetectionBuilder {
    /// Create a new detection builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the centroid, in any number of dimensions.
    pub fn centroid(self, coords: &[f64]) -> Self {
        self.vector(CENTROID, coords.to_vec())
    }

    /// Set the pixel index set.
    pub fn pixel_indices<I: IntoIterator<Item = u64>>(self, indices: I) -> Self {
        self.indices(PIXEL_INDICES, indices)
    }

    pub fn area(self, area: f64) -> Self {
        self.scalar(AREA, area)
    }

    /// Derive pixel indices, area and centroid from linear (row-major)
    /// pixel indices of an image `width` pixels wide.
    ///
    /// The centroid is `[x, y]` in pixel coordinates. An empty index set
    /// only records the empty pixel set.
    pub fn from_pixels<I: IntoIterator<Item = u64>>(self, indices: I, width: u64) -> Self {
        let set: BTreeSet<u64> = indices.into_iter().collect();
        let builder = if !set.is_empty() && width > 0 {
            let (sx, sy) = set.iter().fold((0.0, 0.0), |(sx, sy), &idx| {
                (sx + (idx % width) as f64, sy + (idx / width) as f64)
            });
            let n = set.len() as f64;
            self.area(n).centroid(&[sx / n, sy / n])
        } else {
            self
        };
        builder.value(PIXEL_INDICES, set)
    }

    pub fn scalar(self, field: &str, value: f64) -> Self {
        self.value(field, value)
    }

    pub fn vector(self, field: &str, values: Vec<f64>) -> Self {
        self.value(field, values)
    }

    pub fn indices<I: IntoIterator<Item = u64>>(self, field: &str, indices: I) -> Self {
        self.value(field, Value::indices(indices))
    }

    /// Set any attribute value.
    pub fn value(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.detection.insert(field, value);
        self
    }

    /// Build the final `Detection`.
    pub fn build(self) -> Detection {
        self.detection
    }
}
