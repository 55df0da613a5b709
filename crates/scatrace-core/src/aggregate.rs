//! Aggregation contract (the "post-processor" side of a batch).
//!
//! An [`Aggregator`] reduces many rows into one statistic. It accumulates
//! across `add` calls until `reset`, can absorb the partial state of a peer
//! instance (`merge`), and owns the [`WorkSplit`] policy used when a range is
//! spread over workers.
//!
//! ## Contracts implementors should uphold
//! - `add` reads rows only through the given [`TraceStore`] (so passes apply)
//!   and returns how many valid rows it consumed.
//! - `get` does not mutate state.
//! - Instances are cheap enough to clone once per batch: a trace feeds a
//!   scratch copy and keeps it only when the whole batch succeeds, so a
//!   failing `add` never leaves partial rows behind.
//! - A freshly `reset` instance behaves exactly like a new one.
//! - `merge` is commutative and associative: feeding disjoint parts of a
//!   range to separate instances and merging them must equal feeding the
//!   whole range to one instance.

use crate::progress::Progress;
use crate::split::WorkSplit;
use crate::trace::TraceStore;
use anyhow::Result;
use std::convert::Infallible;
use std::ops::Range;

/// Pluggable aggregation kernel.
pub trait Aggregator: Clone {
    /// Statistic produced by [`Aggregator::get`].
    type Output;

    /// Forget everything accumulated so far.
    fn reset(&mut self);

    /// Accumulate the valid rows of `range`; returns the number of rows used.
    ///
    /// Implementations should tick `progress` once per scanned index.
    fn add(&mut self, store: &mut TraceStore, range: Range<usize>, progress: &Progress)
        -> Result<usize>;

    /// Current result; must not change state.
    fn get(&self) -> Result<Self::Output>;

    /// Absorb the partial state of a peer instance.
    fn merge(&mut self, other: &Self) -> Result<()>;

    /// How a range should be spread over workers.
    fn work_split(&self) -> WorkSplit {
        WorkSplit::Contiguous
    }
}

/// Placeholder type for traces that never carry an aggregator.
///
/// It has no values, so `Trace<NoAggregator>` always takes the
/// materialization path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoAggregator {}

impl Aggregator for NoAggregator {
    type Output = Infallible;

    fn reset(&mut self) {
        match *self {}
    }

    fn add(&mut self, _: &mut TraceStore, _: Range<usize>, _: &Progress) -> Result<usize> {
        match *self {}
    }

    fn get(&self) -> Result<Self::Output> {
        match *self {}
    }

    fn merge(&mut self, _: &Self) -> Result<()> {
        match *self {}
    }

    fn work_split(&self) -> WorkSplit {
        match *self {}
    }
}
