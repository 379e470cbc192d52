//! Serial and parallel composition of resource demands.
//!
//! Workflow planners combine fan-out (parallel) and sequential reuse
//! (serial) of a single worker's budget. The pool sizes admissions from
//! [`Requirements::max`] alone, but both bounds are preserved so higher
//! layers can decide how wide to go.

use serde::{Deserialize, Serialize};

use crate::core::resources::Resources;

/// A resource demand expressed as a floor for a single worker plus a
/// multiplier of parallel width beyond it. The effective maximum is
/// `min * (1 + width)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    min: Resources,
    width: f64,
}

impl Requirements {
    /// Creates requirements with the given floor and width.
    pub fn new(min: Resources, width: f64) -> Self {
        Self { min, width }
    }

    /// The floor for a single worker.
    pub fn min(&self) -> &Resources {
        &self.min
    }

    /// The parallel width multiplier beyond the floor.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// The effective maximum demand, `min * (1 + width)`.
    pub fn max(&self) -> Resources {
        self.min.scale(1.0 + self.width)
    }

    /// Requires that another task of size `r` fit sequentially in the same
    /// worker: the floor absorbs `r`, width is unchanged.
    pub fn add_serial(&mut self, r: &Resources) {
        self.min = self.min.max(r);
    }

    /// Requires `r` of additional concurrent demand. The floor absorbs `r`
    /// and the width grows to the smallest scalar whose maximum covers the
    /// previous maximum plus `r`. The first parallel add against empty
    /// requirements initializes the floor to `r` with zero width.
    pub fn add_parallel(&mut self, r: &Resources) {
        if self.min.is_zero() {
            self.min = r.clone();
            self.width = 0.0;
            return;
        }
        let target = self.max().add(r);
        self.min = self.min.max(r);
        let mut ratio: f64 = 1.0;
        for (_, v) in target.div(&self.min) {
            if v.is_finite() {
                ratio = ratio.max(v);
            }
        }
        self.width = (ratio - 1.0).max(0.0);
    }
}
