//! The trace handle: raw storage + pass pipelines + batch entry point.
//!
//! [`TraceStore`] owns a [`TraceSource`] and the two pass lists and is what
//! aggregators read through. [`Trace`] wraps a store together with an optional
//! attached [`Aggregator`], the `traces_returned` counter and read options,
//! and exposes the single batch entry point [`Trace::read_batch`].

use crate::aggregate::{Aggregator, NoAggregator};
use crate::batch::{Batch, BatchResult};
use crate::config::ReadOptions;
use crate::error::{PassStage, TraceError};
use crate::materialize::materialize;
use crate::pass::{DataPass, PassList, SamplePass};
use crate::progress::Progress;
use crate::source::TraceSource;
use crate::types::{Data, Row, Samples, ValidityKind};
use anyhow::{Context, Result};
use std::fmt;
use std::ops::Range;
use tracing::{debug, info};

/* --------------------------------- store ----------------------------------- */

/// Raw source plus data/sample pass pipelines.
pub struct TraceStore {
    source: Box<dyn TraceSource>,
    data_passes: PassList<dyn DataPass>,
    sample_passes: PassList<dyn SamplePass>,
}

impl TraceStore {
    /// Wrap a source with empty pass lists.
    pub fn new<S: TraceSource + 'static>(source: S) -> Self {
        Self::from_boxed(Box::new(source))
    }

    /// Wrap an already boxed source.
    #[must_use]
    pub fn from_boxed(source: Box<dyn TraceSource>) -> Self {
        Self {
            source,
            data_passes: PassList::new(PassStage::Data),
            sample_passes: PassList::new(PassStage::Samples),
        }
    }

    /// Logical number of rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.source.len()
    }

    /// Whether there are no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Streaming (non-seekable) source.
    #[inline]
    #[must_use]
    pub fn is_pipe(&self) -> bool {
        self.source.is_pipe()
    }

    /// Data passes, in order.
    #[must_use]
    pub const fn data_passes(&self) -> &PassList<dyn DataPass> {
        &self.data_passes
    }

    /// Mutable data passes.
    pub fn data_passes_mut(&mut self) -> &mut PassList<dyn DataPass> {
        &mut self.data_passes
    }

    /// Sample passes, in order.
    #[must_use]
    pub const fn sample_passes(&self) -> &PassList<dyn SamplePass> {
        &self.sample_passes
    }

    /// Mutable sample passes.
    pub fn sample_passes_mut(&mut self) -> &mut PassList<dyn SamplePass> {
        &mut self.sample_passes
    }

    fn check(&self, index: usize) -> Result<()> {
        let len = self.len();
        if index < len {
            Ok(())
        } else {
            Err(TraceError::IndexOutOfRange { index, len }.into())
        }
    }

    /// Row `index` through both pipelines.
    ///
    /// Samples are only read when the data survived. If either side ends up
    /// empty, both are returned empty.
    pub fn read(&mut self, index: usize) -> Result<Row> {
        self.check(index)?;
        let raw = self
            .source
            .read_data(index)
            .with_context(|| format!("read data of row {index}"))?;
        let data = self.data_passes.apply(raw);
        if data.is_empty() {
            return Ok(Row {
                data,
                samples: Samples::F32(Vec::new()),
            });
        }
        let raw = self
            .source
            .read_samples(index)
            .with_context(|| format!("read samples of row {index}"))?;
        let samples = self.sample_passes.apply(raw, index);
        if samples.is_empty() {
            return Ok(Row {
                data: data.empty_like(),
                samples,
            });
        }
        Ok(Row { data, samples })
    }

    /// Write raw values for row `index`, bypassing the passes.
    pub fn write(&mut self, index: usize, data: &Data, samples: &Samples) -> Result<()> {
        self.check(index)?;
        self.source
            .write_data(index, data)
            .with_context(|| format!("write data of row {index}"))?;
        self.source
            .write_samples(index, samples)
            .with_context(|| format!("write samples of row {index}"))
    }

    /// Index of the first row satisfying `kind` (linear scan from 0).
    ///
    /// Each side is judged after its own pipeline; samples are not read when
    /// `kind` only concerns data.
    ///
    /// # Errors
    /// [`TraceError::NotFound`] when no row qualifies.
    pub fn first_valid(&mut self, kind: ValidityKind) -> Result<usize> {
        for index in 0..self.len() {
            let raw = self.source.read_data(index)?;
            let data_len = self.data_passes.apply(raw).len();
            let samples_len = if kind == ValidityKind::NonzeroData {
                0
            } else {
                let raw = self.source.read_samples(index)?;
                self.sample_passes.apply(raw, index).len()
            };
            if kind.accepts(data_len, samples_len) {
                return Ok(index);
            }
        }
        Err(TraceError::NotFound { kind }.into())
    }

    /// Lazily iterate the valid rows of `range`, ticking `progress` once per
    /// scanned index. Re-invoke to restart.
    pub fn rows<'a>(&'a mut self, range: Range<usize>, progress: &'a Progress) -> Rows<'a> {
        Rows {
            store: self,
            next: range.start,
            end: range.end,
            progress,
        }
    }
}

impl fmt::Debug for TraceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceStore")
            .field("len", &self.len())
            .field("pipe", &self.is_pipe())
            .field("data_passes", &self.data_passes.names())
            .field("sample_passes", &self.sample_passes.names())
            .finish()
    }
}

/// Iterator over the valid rows of a range (see [`TraceStore::rows`]).
///
/// Stops after the first error.
pub struct Rows<'a> {
    store: &'a mut TraceStore,
    next: usize,
    end: usize,
    progress: &'a Progress,
}

impl Iterator for Rows<'_> {
    type Item = Result<(usize, Row)>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.end {
            let index = self.next;
            self.next += 1;
            let row = match self.store.read(index) {
                Ok(row) => row,
                Err(e) => {
                    self.next = self.end;
                    return Some(Err(e));
                }
            };
            self.progress.tick(1);
            if row.is_valid() {
                return Some(Ok((index, row)));
            }
        }
        None
    }
}

/* --------------------------------- trace ----------------------------------- */

/// `range` must lie within `[0, len)` unless it is empty.
pub fn check_range(len: usize, range: &Range<usize>) -> Result<()> {
    if range.end > len && !range.is_empty() {
        return Err(TraceError::IndexOutOfRange {
            index: range.end - 1,
            len,
        }
        .into());
    }
    Ok(())
}

/// Aggregator state after a batch, not yet installed on its trace.
#[derive(Clone, Debug)]
pub struct Staged<A> {
    aggregator: A,
    added: usize,
}

impl<A> Staged<A> {
    /// Rows the batch consumed.
    #[must_use]
    pub const fn added(&self) -> usize {
        self.added
    }

    /// The aggregator as it will be once committed.
    #[must_use]
    pub const fn aggregator(&self) -> &A {
        &self.aggregator
    }
}

/// Trace handle with an optional attached aggregator.
pub struct Trace<A = NoAggregator> {
    store: TraceStore,
    post_processor: Option<A>,
    traces_returned: u64,
    options: ReadOptions,
}

impl<A: Aggregator> Trace<A> {
    /// A trace over `source` with default options and no aggregator.
    pub fn new<S: TraceSource + 'static>(source: S) -> Self {
        Self::from_store(TraceStore::new(source))
    }

    /// A trace over an existing store.
    #[must_use]
    pub fn from_store(store: TraceStore) -> Self {
        Self {
            store,
            post_processor: None,
            traces_returned: 0,
            options: ReadOptions::default(),
        }
    }

    /// Replace the read options.
    #[must_use]
    pub const fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }

    /// Current read options.
    #[must_use]
    pub const fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// The store (source + passes).
    #[must_use]
    pub const fn store(&self) -> &TraceStore {
        &self.store
    }

    /// Mutable store, e.g. to edit pass lists.
    pub fn store_mut(&mut self) -> &mut TraceStore {
        &mut self.store
    }

    /// Logical number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Streaming (non-seekable) trace.
    #[must_use]
    pub fn is_pipe(&self) -> bool {
        self.store.is_pipe()
    }

    /// Row `index` through the pass pipelines.
    pub fn read(&mut self, index: usize) -> Result<Row> {
        self.store.read(index)
    }

    /// Raw write, bypassing passes.
    pub fn write(&mut self, index: usize, data: &Data, samples: &Samples) -> Result<()> {
        self.store.write(index, data, samples)
    }

    /// First row satisfying `kind`.
    pub fn first_valid(&mut self, kind: ValidityKind) -> Result<usize> {
        self.store.first_valid(kind)
    }

    /// Attach an aggregator, returning the previous one.
    pub fn attach(&mut self, aggregator: A) -> Option<A> {
        self.post_processor.replace(aggregator)
    }

    /// Detach and return the aggregator.
    pub fn detach(&mut self) -> Option<A> {
        self.post_processor.take()
    }

    /// The attached aggregator, if any.
    #[must_use]
    pub const fn post_processor(&self) -> Option<&A> {
        self.post_processor.as_ref()
    }

    /// Rows handed out so far by materialization or aggregation.
    #[must_use]
    pub const fn traces_returned(&self) -> u64 {
        self.traces_returned
    }

    /// Zero `traces_returned` and reset the attached aggregator.
    pub fn reset(&mut self) {
        self.traces_returned = 0;
        if let Some(a) = self.post_processor.as_mut() {
            a.reset();
        }
    }

    /// Feed `ranges` to a scratch copy of the attached aggregator.
    ///
    /// Nothing on `self` changes until the result is handed to
    /// [`Trace::commit`], so a batch that fails anywhere can simply drop it.
    ///
    /// # Errors
    /// Fails if no aggregator is attached, a range is out of bounds or the
    /// aggregator fails.
    pub fn stage(&mut self, ranges: &[Range<usize>], progress: &Progress) -> Result<Staged<A>> {
        let mut aggregator = self
            .post_processor
            .clone()
            .ok_or_else(|| TraceError::Config("no aggregator attached".to_owned()))?;
        let mut added = 0usize;
        for range in ranges {
            check_range(self.store.len(), range)?;
            added += aggregator.add(&mut self.store, range.clone(), progress)?;
        }
        Ok(Staged { aggregator, added })
    }

    /// Install a staged aggregator and count its rows.
    pub fn commit(&mut self, staged: Staged<A>) {
        self.traces_returned += staged.added as u64;
        self.post_processor = Some(staged.aggregator);
    }

    /// Process `range`: dense matrices when no aggregator is attached,
    /// otherwise the aggregator's merged statistic. `eof` is set when the
    /// range reaches the end of the trace.
    pub fn read_batch(&mut self, range: Range<usize>) -> Result<BatchResult<A::Output>> {
        let progress = Progress::for_batch(
            range.len() as u64,
            self.options.progress,
            self.store.is_pipe(),
            "traces",
        );
        let out = self.read_batch_with(range, &progress);
        progress.finish();
        out
    }

    /// [`Trace::read_batch`] reporting into a caller-supplied progress sink.
    pub fn read_batch_with(
        &mut self,
        range: Range<usize>,
        progress: &Progress,
    ) -> Result<BatchResult<A::Output>> {
        check_range(self.store.len(), &range)?;
        let eof = range.end >= self.store.len();
        debug!(lo = range.start, hi = range.end, pipe = self.store.is_pipe(), "read batch");

        let batch = if self.post_processor.is_some() {
            let staged = self.stage(std::slice::from_ref(&range), progress)?;
            let statistic = staged.aggregator.get()?;
            let added = staged.added;
            self.commit(staged);
            info!(lo = range.start, hi = range.end, added, "aggregated batch");
            Batch::Statistic(statistic)
        } else {
            let m = materialize(&mut self.store, range.clone(), progress)?;
            self.traces_returned += m.rows() as u64;
            info!(lo = range.start, hi = range.end, kept = m.rows(), "materialized batch");
            Batch::Matrices(m)
        };
        Ok(BatchResult { batch, eof })
    }
}

impl<A> fmt::Debug for Trace<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trace")
            .field("store", &self.store)
            .field("attached", &self.post_processor.is_some())
            .field("traces_returned", &self.traces_returned)
            .finish()
    }
}
