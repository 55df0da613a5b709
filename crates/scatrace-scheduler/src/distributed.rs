//! Fan-out/join aggregation over a [`WorkerPool`].
//!
//! Every worker holds an independent trace over the same logical rows plus its
//! own aggregator instance. A batch runs in four steps:
//!
//! 1. ask worker 0 for its aggregator's [`WorkSplit`](scatrace_core::WorkSplit)
//!    and partition the range over the workers;
//! 2. send every worker its ranges together with one shared [`Progress`],
//!    without waiting in between;
//! 3. wait for every reply; any failure aborts the batch here. Workers only
//!    stage their share on a copy of their aggregator, so an aborted batch
//!    leaves every worker (and `traces_returned`) exactly as before;
//! 4. commit the staged state on every worker, hand copies of workers
//!    `1..n` to worker 0, which merges them into a clone of its own
//!    aggregator and returns the merged statistic.
//!
//! Worker state is never changed by the merge, so each worker keeps
//! accumulating its own share until [`DistributedTrace::reset`].

use crate::worker::{join_all, WorkerPool};
use anyhow::Result;
use scatrace_core::{
    check_range, Aggregator, Batch, BatchResult, Progress, ReadOptions, Staged, Trace,
    TraceError,
};
use std::ops::Range;
use tracing::{debug, info};

/// A trace mirrored across worker threads.
#[derive(Debug)]
pub struct DistributedTrace<A> {
    pool: WorkerPool<A>,
    len: usize,
    options: ReadOptions,
}

impl<A> DistributedTrace<A>
where
    A: Aggregator + Send + 'static,
    A::Output: Send + 'static,
{
    /// Spawn `options.workers` workers, each building its trace with
    /// `factory(worker_id)`.
    ///
    /// All workers must report the same length; pipe traces are rejected
    /// since a stream cannot be read by several workers.
    pub fn spawn<F>(options: ReadOptions, factory: F) -> Result<Self>
    where
        F: Fn(usize) -> Result<Trace<A>> + Send + Sync + 'static,
    {
        let pool = WorkerPool::spawn(options.workers.max(1), factory)?;
        let shape = pool.broadcast(|t| Ok((t.len(), t.is_pipe())))?;
        if shape.iter().any(|&(_, pipe)| pipe) {
            return Err(TraceError::Config(
                "pipe traces cannot be read by several workers".to_owned(),
            )
            .into());
        }
        let len = shape.first().map_or(0, |&(len, _)| len);
        if let Some((w, &(other, _))) = shape.iter().enumerate().find(|(_, s)| s.0 != len) {
            return Err(TraceError::Config(format!(
                "worker {w} sees {other} rows but worker 0 sees {len}"
            ))
            .into());
        }
        debug!(workers = pool.workers(), len, "distributed trace ready");
        Ok(Self { pool, len, options })
    }

    /// Logical number of rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether there are no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of workers.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool.workers()
    }

    /// Read options this trace was spawned with.
    #[must_use]
    pub const fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// The underlying pool, e.g. to edit every worker's passes.
    #[must_use]
    pub const fn pool(&self) -> &WorkerPool<A> {
        &self.pool
    }

    /// Run `job` on every worker's trace.
    pub fn broadcast<R, F>(&self, job: F) -> Result<Vec<R>>
    where
        R: Send + 'static,
        F: Fn(&mut Trace<A>) -> Result<R> + Send + Sync + 'static,
    {
        self.pool.broadcast(job)
    }

    /// Rows consumed across all workers since the last reset.
    pub fn traces_returned(&self) -> Result<u64> {
        Ok(self.pool.broadcast(|t| Ok(t.traces_returned()))?.into_iter().sum())
    }

    /// Reset every worker's counter and aggregator.
    pub fn reset(&mut self) -> Result<()> {
        self.pool.broadcast(|t| {
            t.reset();
            Ok(())
        })?;
        Ok(())
    }

    /// Single batch entry point, see the module docs.
    pub fn read_batch(&mut self, range: Range<usize>) -> Result<BatchResult<A::Output>> {
        let progress = Progress::for_batch(range.len() as u64, self.options.progress, false, "traces");
        let out = self.read_batch_with(range, &progress);
        progress.finish();
        out
    }

    /// [`DistributedTrace::read_batch`] reporting into `progress`.
    ///
    /// Without an aggregator on worker 0 the batch is materialized there.
    pub fn read_batch_with(
        &mut self,
        range: Range<usize>,
        progress: &Progress,
    ) -> Result<BatchResult<A::Output>> {
        check_range(self.len, &range)?;
        let eof = range.end >= self.len;

        let split = self
            .pool
            .call(0, |t| Ok(t.post_processor().map(A::work_split)))?;
        let Some(split) = split else {
            let (r, p) = (range.clone(), progress.clone());
            return self.pool.call(0, move |t| t.read_batch_with(r, &p));
        };

        let workers = self.pool.workers();
        let parts = split.partition(range.clone(), workers);
        debug!(lo = range.start, hi = range.end, workers, ?split, "fan out");

        // Fan out, then join on every reply. Staging leaves worker state
        // untouched, so a failure here aborts the batch with nothing to undo.
        let pending = parts
            .into_iter()
            .enumerate()
            .map(|(w, ranges)| {
                let p = progress.clone();
                self.pool.submit(w, move |t| t.stage(&ranges, &p))
            })
            .collect::<Result<Vec<_>>>()?;
        let staged = join_all(pending)?;
        let added: usize = staged.iter().map(Staged::added).sum();

        // Commit everywhere, keeping copies of workers 1.. for the merge.
        let partials: Vec<A> = staged
            .iter()
            .skip(1)
            .map(|s| s.aggregator().clone())
            .collect();
        let commits = staged
            .into_iter()
            .enumerate()
            .map(|(w, s)| {
                self.pool.submit(w, move |t| {
                    t.commit(s);
                    Ok(())
                })
            })
            .collect::<Result<Vec<_>>>()?;
        join_all(commits)?;

        // Reconcile on worker 0.
        let statistic = self.pool.call(0, move |t| {
            let mut acc = t
                .post_processor()
                .cloned()
                .ok_or_else(|| TraceError::Config("no aggregator attached".to_owned()))?;
            for p in &partials {
                acc.merge(p)?;
            }
            acc.get()
        })?;

        info!(lo = range.start, hi = range.end, added, workers, "aggregated batch");
        Ok(BatchResult {
            batch: Batch::Statistic(statistic),
            eof,
        })
    }
}

/// A local or distributed trace behind one `read_batch`.
#[derive(Debug)]
pub enum AnyTrace<A> {
    /// Single-process trace.
    Local(Trace<A>),
    /// Trace mirrored across workers.
    Distributed(DistributedTrace<A>),
}

impl<A> AnyTrace<A>
where
    A: Aggregator + Send + 'static,
    A::Output: Send + 'static,
{
    /// Logical number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Local(t) => t.len(),
            Self::Distributed(d) => d.len(),
        }
    }

    /// Whether there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dense matrices or the (merged) statistic for `range`.
    pub fn read_batch(&mut self, range: Range<usize>) -> Result<BatchResult<A::Output>> {
        match self {
            Self::Local(t) => t.read_batch(range),
            Self::Distributed(d) => d.read_batch(range),
        }
    }

    /// Rows consumed since the last reset.
    pub fn traces_returned(&self) -> Result<u64> {
        match self {
            Self::Local(t) => Ok(t.traces_returned()),
            Self::Distributed(d) => d.traces_returned(),
        }
    }

    /// Zero counters and reset aggregators.
    pub fn reset(&mut self) -> Result<()> {
        match self {
            Self::Local(t) => {
                t.reset();
                Ok(())
            }
            Self::Distributed(d) => d.reset(),
        }
    }
}
