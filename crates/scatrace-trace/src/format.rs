//! Trace envelope shared by the file, JSONL and generator paths.
//!
//! A `TraceFile` declares the element kinds of its data and samples up front;
//! every row must use those kinds. Rows whose data or samples are empty are
//! legal (they are simply invalid rows at read time).

use anyhow::{bail, Result};
use scatrace_core::{Data, ElementKind, Samples};
use serde::{Deserialize, Serialize};

/// Current envelope version.
pub const TRACE_FORMAT_VERSION: u16 = 1;

/// One stored row.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TraceRow {
    /// Auxiliary data.
    pub data: Data,
    /// Measured samples.
    pub samples: Samples,
}

/// Everything but the rows; also the first line of a JSONL stream.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TraceHeader {
    /// Format/version tag for forward-compat.
    pub version: u16,
    /// Element kind of every row's data.
    pub data_kind: ElementKind,
    /// Element kind of every row's samples.
    pub sample_kind: ElementKind,
    /// Number of rows that follow.
    pub len: usize,
    /// Optional metadata (device, acquisition settings, generator seed…).
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

/// Trace envelope.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TraceFile {
    /// Format/version tag for forward-compat.
    pub version: u16,
    /// Element kind of every row's data.
    pub data_kind: ElementKind,
    /// Element kind of every row's samples.
    pub sample_kind: ElementKind,
    /// Row sequence.
    pub rows: Vec<TraceRow>,
    /// Optional metadata.
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

impl TraceFile {
    /// Empty envelope for the given kinds.
    #[must_use]
    pub const fn new(data_kind: ElementKind, sample_kind: ElementKind) -> Self {
        Self {
            version: TRACE_FORMAT_VERSION,
            data_kind,
            sample_kind,
            rows: Vec::new(),
            meta: None,
        }
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row, checking its kinds against the envelope.
    pub fn push(&mut self, data: Data, samples: Samples) -> Result<()> {
        self.check_kinds(self.rows.len(), &data, &samples)?;
        self.rows.push(TraceRow { data, samples });
        Ok(())
    }

    /// Header describing this envelope.
    #[must_use]
    pub fn header(&self) -> TraceHeader {
        TraceHeader {
            version: self.version,
            data_kind: self.data_kind,
            sample_kind: self.sample_kind,
            len: self.rows.len(),
            meta: self.meta.clone(),
        }
    }

    /// Version and per-row kind checks.
    pub fn validate(&self) -> Result<()> {
        if self.version != TRACE_FORMAT_VERSION {
            bail!(
                "unsupported trace version {} (expected {TRACE_FORMAT_VERSION})",
                self.version
            );
        }
        for (i, row) in self.rows.iter().enumerate() {
            self.check_kinds(i, &row.data, &row.samples)?;
        }
        Ok(())
    }

    pub(crate) fn check_kinds(&self, index: usize, data: &Data, samples: &Samples) -> Result<()> {
        if data.kind() != self.data_kind {
            bail!(
                "row {index}: data kind {} does not match trace data kind {}",
                data.kind(),
                self.data_kind
            );
        }
        if samples.kind() != self.sample_kind {
            bail!(
                "row {index}: sample kind {} does not match trace sample kind {}",
                samples.kind(),
                self.sample_kind
            );
        }
        Ok(())
    }
}
