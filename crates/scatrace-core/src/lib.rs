//! scatrace-core: trace abstraction, pass pipeline, batch reader and the
//! aggregation contract.
//!
//! This crate defines the **stable boundary** used across scatrace crates:
//! - canonical row types (`Data`, `Samples`, `Row`, `ValidityKind`),
//! - the raw storage trait (`TraceSource`) and ordered pass pipelines,
//! - the trace handle with its single batch entry point (`Trace::read_batch`),
//!   which either materializes dense matrices or delegates to an attached
//!   `Aggregator`,
//! - work-split policies and best-effort progress accounting used by the
//!   distributed protocol in `scatrace-scheduler`.
//!
//! ```no_run
//! use scatrace_core::{Data, MemorySource, Samples, Trace};
//!
//! let src = MemorySource::from_rows([(Data::U8(vec![1, 2]), Samples::F32(vec![0.5, 0.25]))]);
//! let mut trace: Trace = Trace::new(src);
//! let out = trace.read_batch(0..1)?;
//! assert!(out.eof);
//! # Ok::<(), anyhow::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![deny(missing_docs)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
// Small, explicit allowlist to keep docs readable and APIs ergonomic.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::doc_markdown,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

/// Aggregation contract and the `NoAggregator` placeholder.
pub mod aggregate;
/// Batch result types.
pub mod batch;
/// Read options and environment overrides.
pub mod config;
/// Typed error conditions.
pub mod error;
mod materialize;
/// Dense and bit-packed matrices.
pub mod matrix;
/// Data/sample passes and pass lists.
pub mod pass;
/// Shared best-effort progress sink.
pub mod progress;
/// Raw storage trait and the in-memory source.
pub mod source;
/// Work-split policies.
pub mod split;
/// Trace store and trace handle.
pub mod trace;
/// Canonical row types.
pub mod types;

// ---- Re-exports for workspace compatibility ----
pub use aggregate::*;
pub use batch::*;
pub use config::*;
pub use error::*;
pub use matrix::{BitMatrix, DataMatrix, Matrix, SampleMatrix};
pub use pass::{DataPass, PassList, SamplePass};
pub use progress::Progress;
pub use source::*;
pub use split::*;
pub use trace::*;
pub use types::*;

/// Commonly-used items for quick imports.
///
/// ```rust
/// use scatrace_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        aggregate::Aggregator, batch::*, progress::Progress, source::TraceSource, split::WorkSplit,
        trace::*, types::*,
    };
}
