//! Silhouette (bounding box) height tracks.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Axis-aligned detection box in image coordinates (y grows downwards).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_top: f64,
    pub x_max: f64,
    pub y_bottom: f64,
}

impl BoundingBox {
    pub fn new(x_min: f64, y_top: f64, x_max: f64, y_bottom: f64) -> Self {
        Self {
            x_min,
            y_top,
            x_max,
            y_bottom,
        }
    }

    /// Height of a well-formed box, `None` for degenerate or non-finite boxes.
    pub fn height(&self) -> Option<f64> {
        let h = self.y_bottom - self.y_top;
        (h.is_finite() && h > 0.0).then_some(h)
    }
}

/// Trailing window of silhouette heights for one entity.
#[derive(Clone, Debug)]
pub struct SilhouetteTrack {
    capacity: usize,
    samples: VecDeque<(u64, f64)>,
}

impl SilhouetteTrack {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Add the box observed at `frame`. Returns its height when usable.
    ///
    /// Frames not newer than the last sample are ignored.
    pub fn push_box(&mut self, frame: u64, bbox: &BoundingBox) -> Option<f64> {
        let h = bbox.height()?;
        if self.samples.back().is_some_and(|&(last, _)| frame <= last) {
            return None;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((frame, h));
        Some(h)
    }

    /// Retained heights, oldest first.
    pub fn heights(&self) -> Vec<f64> {
        self.samples.iter().map(|&(_, h)| h).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
