//! Sample-wise averages grouped by data value.
//!
//! For every data column `c` and every value `v` seen in that column, the
//! kernel keeps the number of rows with `data[c] == v` and the sample-wise sum
//! of those rows. Merging adds counts and sums, so it is commutative and
//! associative (exactly so while the sums stay integral and below 2^53).

use crate::check_width;
use anyhow::{bail, Result};
use scatrace_core::{Aggregator, Progress, TraceStore, WorkSplit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::debug;

#[derive(Clone, Debug, Default, PartialEq)]
struct Class {
    count: u64,
    sums: Vec<f64>,
}

/// Mean trace of one (column, value) class.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClassMean {
    /// Data column.
    pub column: usize,
    /// Value of that column.
    pub value: u32,
    /// Rows in the class.
    pub count: u64,
    /// Sample-wise mean.
    pub mean: Vec<f64>,
}

/// Conditional-average kernel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CondAvg {
    split: WorkSplit,
    width: Option<usize>,
    classes: BTreeMap<(usize, u32), Class>,
}

impl CondAvg {
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

    /// Number of (column, value) classes seen so far.
    #[must_use]
    pub fn classes(&self) -> usize {
        self.classes.len()
    }
}

impl Aggregator for CondAvg {
    type Output = Vec<ClassMean>;

    fn reset(&mut self) {
        self.width = None;
        self.classes.clear();
    }

    fn add(&mut self, store: &mut TraceStore, range: Range<usize>, progress: &Progress) -> Result<usize> {
        let mut added = 0usize;
        for item in store.rows(range.clone(), progress) {
            let (index, row) = item?;
            check_width(&mut self.width, index, &row)?;
            let samples = row.samples.to_f64();
            for column in 0..row.data.len() {
                let Some(value) = row.data.get_u32(column) else {
                    continue;
                };
                let class = self.classes.entry((column, value)).or_insert_with(|| Class {
                    count: 0,
                    sums: vec![0.0; samples.len()],
                });
                class.count += 1;
                for (s, x) in class.sums.iter_mut().zip(&samples) {
                    *s += x;
                }
            }
            added += 1;
        }
        debug!(lo = range.start, hi = range.end, added, classes = self.classes(), "cond-avg add");
        Ok(added)
    }

    fn get(&self) -> Result<Self::Output> {
        Ok(self
            .classes
            .iter()
            .map(|(&(column, value), c)| ClassMean {
                column,
                value,
                count: c.count,
                mean: c.sums.iter().map(|s| s / c.count as f64).collect(),
            })
            .collect())
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        match (self.width, other.width) {
            (Some(a), Some(b)) if a != b => {
                bail!("cannot merge conditional averages of width {a} and {b}")
            }
            (None, w) => self.width = w,
            _ => {}
        }
        for (key, theirs) in &other.classes {
            match self.classes.get_mut(key) {
                Some(ours) => {
                    ours.count += theirs.count;
                    for (s, x) in ours.sums.iter_mut().zip(&theirs.sums) {
                        *s += x;
                    }
                }
                None => {
                    self.classes.insert(*key, theirs.clone());
                }
            }
        }
        Ok(())
    }

    fn work_split(&self) -> WorkSplit {
        self.split
    }
}
