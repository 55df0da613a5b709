//! Trace envelope, concrete trace sources and a synthetic generator.
//!
//! This crate provides the storage-side collaborators of `scatrace-core`:
//!
//! - `format`: a minimal, versioned trace envelope (`TraceFile`).
//! - `io`: JSON/CBOR/JSONL read/write helpers for `TraceFile`.
//! - `file`: `FileTrace`, a file-backed `TraceSource` with explicit flush.
//! - `pipe`: `PipeTrace`, a forward-only `TraceSource` over JSONL input.
//! - `generator`: deterministic synthetic leakage traces for tests/benches.
//!
//! We intentionally avoid broad re-exports so callers use stable paths like
//! `scatrace_trace::pipe::PipeTrace`.

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

/// File-backed trace source.
pub mod file;
/// Versioned trace envelope.
pub mod format;
/// Deterministic synthetic leakage generator (for sims/benches).
pub mod generator;
/// JSON/CBOR/JSONL I/O helpers for `TraceFile`.
pub mod io;
/// Streaming (pipe) trace source over JSONL.
pub mod pipe;
