//! Distributed reduction over worker-local traces.
//!
//! - [`WorkerPool`]: N OS threads, each owning a `Trace<A>` built inside the
//!   thread by a factory, reached through request/response channels.
//! - [`DistributedTrace`]: the fan-out/join aggregation protocol on top of a
//!   pool, with the same `read_batch` entry point as a local trace.
//! - [`AnyTrace`]: local or distributed, chosen at construction.
//!
//! Workers share nothing but the batch's progress handle. A batch fans its
//! partition out to every worker, waits for every reply, and only then asks
//! worker 0 for the merged statistic; any worker failure aborts the batch.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

/// Fan-out/join aggregation protocol and the local/distributed enum.
pub mod distributed;
/// Thread-per-worker pool with typed request/response calls.
pub mod worker;

pub use distributed::{AnyTrace, DistributedTrace};
pub use worker::{Pending, WorkerPool};
