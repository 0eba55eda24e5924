//! Scalar-or-series attribute values
//!
//! Most component attributes are either a single value that holds for every
//! timestep or an explicit per-timestep series. [`Sequence`] covers both so
//! formulation code can always ask for "the value at timestep `t`".

use serde::{Deserialize, Serialize};

/// A value that is either constant over the horizon or given per timestep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sequence {
    /// Same value at every timestep
    Scalar(f64),
    /// One value per timestep, indexed by timestep position
    Series(Vec<f64>),
}

impl Sequence {
    /// Value at timestep position `t`, if defined.
    #[inline]
    pub fn get(&self, t: usize) -> Option<f64> {
        match self {
            Sequence::Scalar(value) => Some(*value),
            Sequence::Series(values) => values.get(t).copied(),
        }
    }

    /// Value at timestep position `t`.
    ///
    /// Callers are expected to have checked [`Sequence::covers`] for the
    /// horizon; a series that is too short yields `NaN`.
    #[inline]
    pub fn at(&self, t: usize) -> f64 {
        self.get(t).unwrap_or(f64::NAN)
    }

    /// True if every timestep in `0..len` has a value.
    pub fn covers(&self, len: usize) -> bool {
        match self {
            Sequence::Scalar(_) => true,
            Sequence::Series(values) => values.len() >= len,
        }
    }

    /// Sum of the first `len` values.
    pub fn sum(&self, len: usize) -> f64 {
        (0..len).map(|t| self.at(t)).sum()
    }

    /// True if any of the first `len` values differs from zero.
    pub fn any_nonzero(&self, len: usize) -> bool {
        (0..len).any(|t| self.at(t) != 0.0)
    }

    /// True if every value in `0..len` satisfies `predicate`.
    pub fn all(&self, len: usize, predicate: impl Fn(f64) -> bool) -> bool {
        (0..len).all(|t| predicate(self.at(t)))
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Sequence::Scalar(0.0)
    }
}

impl From<f64> for Sequence {
    fn from(value: f64) -> Self {
        Sequence::Scalar(value)
    }
}

impl From<Vec<f64>> for Sequence {
    fn from(values: Vec<f64>) -> Self {
        Sequence::Series(values)
    }
}

impl From<&[f64]> for Sequence {
    fn from(values: &[f64]) -> Self {
        Sequence::Series(values.to_vec())
    }
}
