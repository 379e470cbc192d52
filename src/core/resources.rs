//! Multi-dimensional resource vectors.
//!
//! A [`Resources`] value maps resource names to nonnegative quantities:
//! `mem` and `disk` in bytes, `cpu` as a count, plus opaque dimensions
//! such as per-CPU hardware-feature flags carried as counts. Dimensions
//! absent from a vector read as zero, and every operation produces the
//! union of its inputs' dimensions.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Memory dimension, in bytes.
pub const MEM: &str = "mem";
/// CPU dimension, as a count.
pub const CPU: &str = "cpu";
/// Disk dimension, in bytes.
pub const DISK: &str = "disk";

/// A vector of named resource quantities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resources(HashMap<String, f64>);

impl Resources {
    /// Returns the quantity for `key`, zero if absent.
    pub fn get(&self, key: &str) -> f64 {
        self.0.get(key).copied().unwrap_or(0.0)
    }

    /// Sets the quantity for `key`.
    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), value);
    }

    /// Iterates over the dimensions present in this vector.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Whether every dimension is zero. The empty vector is zero.
    pub fn is_zero(&self) -> bool {
        self.0.values().all(|v| *v == 0.0)
    }

    fn keys_union<'a>(&'a self, other: &'a Self) -> impl Iterator<Item = &'a str> {
        let mut keys: Vec<&str> = self.0.keys().chain(other.0.keys()).map(String::as_str).collect();
        keys.sort_unstable();
        keys.dedup();
        keys.into_iter()
    }

    fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        let mut out = HashMap::new();
        for key in self.keys_union(other) {
            out.insert(key.to_string(), f(self.get(key), other.get(key)));
        }
        Self(out)
    }

    /// Componentwise sum.
    pub fn add(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a + b)
    }

    /// Componentwise difference. Negative results are permitted so that
    /// planners can see by how much a demand overshoots.
    pub fn sub(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a - b)
    }

    /// Componentwise minimum.
    pub fn min(&self, other: &Self) -> Self {
        self.zip_with(other, f64::min)
    }

    /// Componentwise maximum.
    pub fn max(&self, other: &Self) -> Self {
        self.zip_with(other, f64::max)
    }

    /// Scales every dimension by `factor`.
    pub fn scale(&self, factor: f64) -> Self {
        Self(self.0.iter().map(|(k, v)| (k.clone(), v * factor)).collect())
    }

    /// Per-dimension ratio of `self` to `other` over the union of their
    /// dimensions. A zero denominator yields infinity for a nonzero
    /// numerator and zero otherwise.
    pub fn div(&self, other: &Self) -> HashMap<String, f64> {
        let mut out = HashMap::new();
        for key in self.keys_union(other) {
            let num = self.get(key);
            let den = other.get(key);
            let ratio = if den != 0.0 {
                num / den
            } else if num != 0.0 {
                f64::INFINITY
            } else {
                0.0
            };
            out.insert(key.to_string(), ratio);
        }
        out
    }

    /// Whether this vector covers `other`: for every dimension present in
    /// `other`, this vector's quantity is at least as large. This is the
    /// admission predicate, and the only asymmetric operation.
    pub fn available(&self, other: &Self) -> bool {
        other.iter().all(|(key, want)| self.get(key) >= want)
    }
}

impl PartialEq for Resources {
    fn eq(&self, other: &Self) -> bool {
        let mut keys: Vec<&String> = self.0.keys().chain(other.0.keys()).collect();
        keys.sort_unstable();
        keys.dedup();
        keys.into_iter().all(|k| self.get(k) == other.get(k))
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.0.keys().collect();
        keys.sort_unstable();
        write!(f, "{{")?;
        for (i, key) in keys.into_iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{key}:{}", self.get(key))?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(String, f64)> for Resources {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
