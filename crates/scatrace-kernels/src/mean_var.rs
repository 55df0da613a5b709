//! Per-point mean and variance.
//!
//! Each sample point keeps Welford's running mean and `M2` (sum of squared
//! deviations). Two partial states combine with Chan et al.'s parallel update,
//! so splitting the rows over workers gives the same result up to rounding.

use crate::check_width;
use anyhow::{bail, Result};
use scatrace_core::{Aggregator, Progress, TraceStore, WorkSplit};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

/// Result of [`MeanVar::get`].
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PointStats {
    /// Rows aggregated.
    pub count: u64,
    /// Mean per sample point.
    pub mean: Vec<f64>,
    /// Sample variance (`n - 1` denominator) per point; 0 below two rows.
    pub variance: Vec<f64>,
}

/// Mean/variance kernel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeanVar {
    split: WorkSplit,
    width: Option<usize>,
    count: u64,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl MeanVar {
    /// Empty kernel with the default (contiguous) work split.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `split` when spread over workers.
    #[must_use]
    pub const fn with_split(mut self, split: WorkSplit) -> Self {
        self.split = split;
        self
    }

    /// Rows aggregated so far.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    fn update(&mut self, x: &[f64]) {
        if self.mean.is_empty() {
            self.mean = vec![0.0; x.len()];
            self.m2 = vec![0.0; x.len()];
        }
        self.count += 1;
        let n = self.count as f64;
        for ((mean, m2), &v) in self.mean.iter_mut().zip(self.m2.iter_mut()).zip(x) {
            let delta = v - *mean;
            *mean += delta / n;
            *m2 += delta * (v - *mean);
        }
    }
}

impl Aggregator for MeanVar {
    type Output = PointStats;

    fn reset(&mut self) {
        let split = self.split;
        *self = Self::default().with_split(split);
    }

    fn add(&mut self, store: &mut TraceStore, range: Range<usize>, progress: &Progress) -> Result<usize> {
        let mut added = 0usize;
        for item in store.rows(range.clone(), progress) {
            let (index, row) = item?;
            check_width(&mut self.width, index, &row)?;
            self.update(&row.samples.to_f64());
            added += 1;
        }
        debug!(lo = range.start, hi = range.end, added, "mean-var add");
        Ok(added)
    }

    fn get(&self) -> Result<Self::Output> {
        let variance = if self.count < 2 {
            vec![0.0; self.m2.len()]
        } else {
            let d = (self.count - 1) as f64;
            self.m2.iter().map(|m| m / d).collect()
        };
        Ok(PointStats {
            count: self.count,
            mean: self.mean.clone(),
            variance,
        })
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        if other.count == 0 {
            return Ok(());
        }
        if self.count == 0 {
            let split = self.split;
            *self = other.clone();
            self.split = split;
            return Ok(());
        }
        if self.mean.len() != other.mean.len() {
            bail!(
                "cannot merge mean/variance of width {} and {}",
                self.mean.len(),
                other.mean.len()
            );
        }
        let (na, nb) = (self.count as f64, other.count as f64);
        let n = na + nb;
        for i in 0..self.mean.len() {
            let delta = other.mean[i] - self.mean[i];
            self.mean[i] += delta * nb / n;
            self.m2[i] += other.m2[i] + delta * delta * na * nb / n;
        }
        self.count += other.count;
        Ok(())
    }

    fn work_split(&self) -> WorkSplit {
        self.split
    }
}
