//! Thread-per-worker pool.
//!
//! Each worker thread builds its own [`Trace`] by calling the factory with its
//! worker id, then serves jobs from an unbounded request channel until the
//! pool is dropped. A job is a closure run against the worker's trace; its
//! result travels back on a one-shot reply channel owned by a [`Pending`].
//!
//! A worker that panics drops its channels while unwinding, so every pending
//! or later call to it reports [`TraceError::WorkerLost`].

use anyhow::Result;
use crossbeam_channel as chan;
use scatrace_core::{Aggregator, Trace, TraceError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type Job<A> = Box<dyn FnOnce(&mut Trace<A>) + Send>;

/// Reply to a submitted job; [`Pending::wait`] blocks until it arrives.
#[derive(Debug)]
#[must_use = "a submitted job's result is only observed through `wait`"]
pub struct Pending<R> {
    worker: usize,
    rx: chan::Receiver<Result<R>>,
}

impl<R> Pending<R> {
    /// Worker the job was sent to.
    #[must_use]
    pub const fn worker(&self) -> usize {
        self.worker
    }

    /// Block for the reply. Job errors become [`TraceError::Worker`]; a
    /// vanished worker becomes [`TraceError::WorkerLost`].
    pub fn wait(self) -> Result<R> {
        match self.rx.recv() {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(TraceError::Worker {
                worker: self.worker,
                message: format!("{e:#}"),
            }
            .into()),
            Err(chan::RecvError) => Err(TraceError::WorkerLost {
                worker: self.worker,
            }
            .into()),
        }
    }
}

/// Wait on every pending reply (full barrier), then return the results in
/// submission order, or the first error.
pub fn join_all<R>(pending: Vec<Pending<R>>) -> Result<Vec<R>> {
    let mut out = Vec::with_capacity(pending.len());
    let mut first_err = None;
    for p in pending {
        let worker = p.worker();
        match p.wait() {
            Ok(v) => out.push(v),
            Err(e) => {
                debug!(worker, error = %e, "job failed");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }
    first_err.map_or(Ok(out), Err)
}

/// Worker threads, each owning one trace.
pub struct WorkerPool<A> {
    senders: Vec<chan::Sender<Job<A>>>,
    handles: Vec<JoinHandle<()>>,
}

impl<A: Aggregator + 'static> WorkerPool<A> {
    /// Spawn `workers` threads; worker `i` runs `factory(i)` to build its trace.
    ///
    /// Returns once every worker has built its trace. If any factory call
    /// fails, the already running workers are shut down and the first failure
    /// is returned.
    pub fn spawn<F>(workers: usize, factory: F) -> Result<Self>
    where
        F: Fn(usize) -> Result<Trace<A>> + Send + Sync + 'static,
    {
        if workers == 0 {
            return Err(TraceError::Config("worker count must be at least 1".to_owned()).into());
        }
        let factory = Arc::new(factory);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        let mut ready = Vec::with_capacity(workers);

        for id in 0..workers {
            let (tx, rx) = chan::unbounded::<Job<A>>();
            let (ready_tx, ready_rx) = chan::bounded::<Result<()>>(1);
            let factory = Arc::clone(&factory);
            let handle = thread::Builder::new()
                .name(format!("scatrace-worker-{id}"))
                .spawn(move || worker_loop(id, factory.as_ref(), &ready_tx, &rx))
                .map_err(|e| TraceError::Worker {
                    worker: id,
                    message: format!("spawn thread: {e}"),
                })?;
            senders.push(tx);
            handles.push(handle);
            ready.push(Pending {
                worker: id,
                rx: ready_rx,
            });
        }

        let pool = Self { senders, handles };
        join_all(ready)?;
        debug!(workers, "worker pool ready");
        Ok(pool)
    }

    /// Number of workers.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    /// Queue `job` on `worker` without waiting for it.
    pub fn submit<R, F>(&self, worker: usize, job: F) -> Result<Pending<R>>
    where
        R: Send + 'static,
        F: FnOnce(&mut Trace<A>) -> Result<R> + Send + 'static,
    {
        let tx = self.senders.get(worker).ok_or_else(|| {
            TraceError::Config(format!(
                "no worker {worker} (pool has {})",
                self.senders.len()
            ))
        })?;
        let (reply_tx, reply_rx) = chan::bounded::<Result<R>>(1);
        let boxed: Job<A> = Box::new(move |trace| {
            // The caller may have given up on the reply; nothing to do then.
            let _ = reply_tx.send(job(trace));
        });
        tx.send(boxed)
            .map_err(|_| TraceError::WorkerLost { worker })?;
        Ok(Pending {
            worker,
            rx: reply_rx,
        })
    }

    /// Run `job` on `worker` and wait for its result.
    pub fn call<R, F>(&self, worker: usize, job: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Trace<A>) -> Result<R> + Send + 'static,
    {
        self.submit(worker, job)?.wait()
    }

    /// Run `job` on every worker: fan out first, then join all replies.
    pub fn broadcast<R, F>(&self, job: F) -> Result<Vec<R>>
    where
        R: Send + 'static,
        F: Fn(&mut Trace<A>) -> Result<R> + Send + Sync + 'static,
    {
        let job = Arc::new(job);
        let pending = (0..self.workers())
            .map(|w| {
                let job = Arc::clone(&job);
                self.submit(w, move |t| job(t))
            })
            .collect::<Result<Vec<_>>>()?;
        join_all(pending)
    }
}

fn worker_loop<A, F>(
    id: usize,
    factory: &F,
    ready: &chan::Sender<Result<()>>,
    rx: &chan::Receiver<Job<A>>,
) where
    A: Aggregator,
    F: Fn(usize) -> Result<Trace<A>>,
{
    let mut trace = match factory(id) {
        Ok(t) => {
            let _ = ready.send(Ok(()));
            t
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    debug!(worker = id, len = trace.len(), "worker started");
    for job in rx {
        job(&mut trace);
    }
    debug!(worker = id, "worker stopped");
}

impl<A> Drop for WorkerPool<A> {
    fn drop(&mut self) {
        // Closing the request channels ends every worker loop.
        self.senders.clear();
        for (id, h) in self.handles.drain(..).enumerate() {
            if h.join().is_err() {
                warn!(worker = id, "worker thread panicked");
            }
        }
    }
}

impl<A> std::fmt::Debug for WorkerPool<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.senders.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scatrace_core::{Data, MemorySource, NoAggregator, Samples};

    fn pool(n: usize) -> WorkerPool<NoAggregator> {
        WorkerPool::spawn(n, |id| {
            Ok(Trace::new(MemorySource::from_rows(
                (0..=id).map(|i| (Data::U8(vec![i as u8]), Samples::F32(vec![1.0]))),
            )))
        })
        .unwrap()
    }

    #[test]
    fn each_worker_builds_its_own_trace() {
        let p = pool(3);
        assert_eq!(p.workers(), 3);
        let lens = p.broadcast(|t| Ok(t.len())).unwrap();
        assert_eq!(lens, vec![1, 2, 3]);
    }

    #[test]
    fn job_error_names_the_worker() {
        let p = pool(2);
        let err = p
            .call(1, |_| -> Result<()> { anyhow::bail!("boom") })
            .unwrap_err();
        match err.downcast_ref::<TraceError>() {
            Some(TraceError::Worker { worker, message }) => {
                assert_eq!(*worker, 1);
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn panicking_worker_is_lost() {
        let p = pool(2);
        let err = p.call(0, |_| -> Result<()> { panic!("worker bug") }).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TraceError>(),
            Some(TraceError::WorkerLost { worker: 0 })
        ));
        // Later calls to the dead worker fail the same way; others still work.
        assert!(p.call(0, |t| Ok(t.len())).is_err());
        assert_eq!(p.call(1, |t| Ok(t.len())).unwrap(), 2);
    }

    #[test]
    fn failing_factory_fails_spawn() {
        let err = WorkerPool::<NoAggregator>::spawn(3, |id| {
            if id == 2 {
                anyhow::bail!("no trace for worker {id}");
            }
            Ok(Trace::new(MemorySource::default()))
        })
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TraceError>(),
            Some(TraceError::Worker { worker: 2, .. })
        ));
    }

    #[test]
    fn zero_workers_is_a_config_error() {
        let err = WorkerPool::<NoAggregator>::spawn(0, |_| Ok(Trace::new(MemorySource::default())))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<TraceError>(), Some(TraceError::Config(_))));
    }
}
