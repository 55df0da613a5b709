//! Typed error conditions.
//!
//! Public APIs return `anyhow::Result`; the conditions callers may want to
//! branch on are raised as [`TraceError`] so they survive `.context(..)` and
//! can be recovered with `err.downcast_ref::<TraceError>()`.

use crate::types::{ElementKind, ValidityKind};
use std::fmt;
use thiserror::Error;

/// Which pass list an operation targeted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassStage {
    /// Passes applied to auxiliary data.
    Data,
    /// Passes applied to samples.
    Samples,
}

impl fmt::Display for PassStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => f.write_str("data"),
            Self::Samples => f.write_str("sample"),
        }
    }
}

/// Conditions raised by the trace engine.
#[derive(Debug, Error)]
pub enum TraceError {
    /// No usable analysis parameters for an input; raised before any trace I/O.
    #[error("configuration error: {0}")]
    Config(String),

    /// No row satisfies the requested validity kind.
    #[error("no valid row found (validity kind {kind})")]
    NotFound {
        /// The validity kind that was requested.
        kind: ValidityKind,
    },

    /// A pass was removed from an empty pass list.
    #[error("cannot remove a pass: the {stage} pass list is empty")]
    EmptyPassList {
        /// Which list was empty.
        stage: PassStage,
    },

    /// Index outside `[0, len)`.
    #[error("trace index {index} out of range (length {len})")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Logical trace length.
        len: usize,
    },

    /// A streaming source was asked to go backwards.
    #[error("streaming trace cannot seek back to index {requested} (at {position})")]
    NotSeekable {
        /// Requested index.
        requested: usize,
        /// Current stream position.
        position: usize,
    },

    /// A valid row disagrees with the shape of the first valid row of a batch.
    #[error("row {index}: expected {expected_len} x {expected_kind}, found {found_len} x {found_kind}")]
    RowShape {
        /// Offending row index.
        index: usize,
        /// Element kind of the first valid row.
        expected_kind: ElementKind,
        /// Length of the first valid row.
        expected_len: usize,
        /// Element kind found.
        found_kind: ElementKind,
        /// Length found.
        found_len: usize,
    },

    /// A worker reported an error while executing a request.
    #[error("worker {worker} failed: {message}")]
    Worker {
        /// Worker id (0-based).
        worker: usize,
        /// Rendered error chain from the worker.
        message: String,
    },

    /// A worker went away (thread exited or panicked) before replying.
    #[error("worker {worker} is gone")]
    WorkerLost {
        /// Worker id (0-based).
        worker: usize,
    },
}
