//! Discrete time index shared by every block.
//!
//! Timesteps are addressed by position `0..len()`. The labels given at
//! construction only fix the ordering and are kept for reporting.
//! [`TimeIndex::previous`] is periodic: the predecessor of the first timestep
//! is the last one, which is what closes the storage balance into a cycle.

use chrono::{DateTime, Utc};
use esm_core::Sequence;

use crate::error::{ModelError, ModelResult};

#[derive(Debug, Clone, PartialEq)]
pub struct TimeIndex {
    labels: Vec<i64>,
    increment: Sequence,
}

impl TimeIndex {
    /// Build an index from strictly increasing labels and a step duration in
    /// hours (scalar or one value per timestep).
    pub fn new(labels: Vec<i64>, increment: impl Into<Sequence>) -> ModelResult<Self> {
        let increment = increment.into();
        if labels.is_empty() {
            return Err(ModelError::config("time index has no timesteps"));
        }
        if let Some(w) = labels.windows(2).find(|w| w[0] >= w[1]) {
            return Err(ModelError::config(format!(
                "timesteps must be strictly increasing, found {} followed by {}",
                w[0], w[1]
            )));
        }
        if !increment.covers(labels.len()) {
            return Err(ModelError::config(format!(
                "time increment series is shorter than the {} timesteps",
                labels.len()
            )));
        }
        if !increment.all(labels.len(), |dt| dt.is_finite() && dt > 0.0) {
            return Err(ModelError::config(
                "time increment must be positive and finite",
            ));
        }
        Ok(Self { labels, increment })
    }

    /// `len` consecutive timesteps labelled `0..len` of equal duration.
    pub fn uniform(len: usize, increment: f64) -> ModelResult<Self> {
        Self::new((0..len as i64).collect(), increment)
    }

    /// Index over evenly spaced UTC timestamps; the increment is the spacing in hours.
    ///
    /// At least two timestamps are needed to derive the spacing.
    pub fn from_datetimes(stamps: &[DateTime<Utc>]) -> ModelResult<Self> {
        if stamps.len() < 2 {
            return Err(ModelError::config(
                "at least two timestamps are needed to derive the time increment",
            ));
        }
        let step = stamps[1] - stamps[0];
        if let Some(w) = stamps.windows(2).find(|w| w[1] - w[0] != step) {
            return Err(ModelError::config(format!(
                "timestamps are not evenly spaced at {}",
                w[1]
            )));
        }
        let hours = step.num_seconds() as f64 / 3600.0;
        Self::new(stamps.iter().map(|s| s.timestamp()).collect(), hours)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false; an index cannot be built empty.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn positions(&self) -> std::ops::Range<usize> {
        0..self.labels.len()
    }

    pub fn first(&self) -> usize {
        0
    }

    pub fn last(&self) -> usize {
        self.labels.len() - 1
    }

    /// Periodic predecessor: `previous(first) == last`.
    #[inline]
    pub fn previous(&self, t: usize) -> usize {
        if t == 0 {
            self.last()
        } else {
            t - 1
        }
    }

    /// Duration of timestep `t` in hours.
    #[inline]
    pub fn increment(&self, t: usize) -> f64 {
        self.increment.at(t)
    }

    pub fn label(&self, t: usize) -> Option<i64> {
        self.labels.get(t).copied()
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }
}
