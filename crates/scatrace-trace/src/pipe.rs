//! Forward-only trace source over a JSON Lines stream (e.g. stdin).
//!
//! Rows are pulled from the reader on demand and only the most recent one is
//! kept, so the same index may be read twice (data, then samples) but never an
//! earlier one. The row count comes from the stream header.

use crate::format::{TraceHeader, TraceRow};
use crate::io::JsonlRows;
use anyhow::{anyhow, bail, Result};
use scatrace_core::{Data, Samples, TraceError, TraceSource};
use std::io::{BufRead, BufReader, Stdin};

/// Streaming `TraceSource`; `is_pipe()` is always true.
pub struct PipeTrace<R> {
    header: TraceHeader,
    rows: JsonlRows<R>,
    /// Rows pulled from the stream so far.
    consumed: usize,
    current: Option<(usize, TraceRow)>,
}

impl<R: BufRead> PipeTrace<R> {
    /// Read the header line from `rdr`.
    pub fn new(rdr: R) -> Result<Self> {
        let (header, rows) = JsonlRows::open(rdr)?;
        Ok(Self {
            header,
            rows,
            consumed: 0,
            current: None,
        })
    }

    /// Stream header.
    #[must_use]
    pub const fn header(&self) -> &TraceHeader {
        &self.header
    }

    /// Advance to `index` and return that row.
    fn seek(&mut self, index: usize) -> Result<&TraceRow> {
        if index >= self.header.len {
            return Err(TraceError::IndexOutOfRange {
                index,
                len: self.header.len,
            }
            .into());
        }
        if let Some((at, _)) = &self.current {
            if *at > index {
                return Err(TraceError::NotSeekable {
                    requested: index,
                    position: *at,
                }
                .into());
            }
        }
        while self.current.as_ref().map_or(true, |(at, _)| *at < index) {
            let row = match self.rows.next() {
                Some(row) => row?,
                None => bail!(
                    "stream ended at line {} after {} of {} announced rows",
                    self.rows.line_no(),
                    self.consumed,
                    self.header.len
                ),
            };
            self.current = Some((self.consumed, row));
            self.consumed += 1;
        }
        self.current
            .as_ref()
            .map(|(_, row)| row)
            .ok_or_else(|| anyhow!("no row buffered at index {index}"))
    }
}

impl PipeTrace<BufReader<Stdin>> {
    /// Pipe over standard input.
    pub fn stdin() -> Result<Self> {
        Self::new(BufReader::new(std::io::stdin()))
    }
}

impl<R: BufRead + Send> TraceSource for PipeTrace<R> {
    fn len(&self) -> usize {
        self.header.len
    }

    fn read_data(&mut self, index: usize) -> Result<Data> {
        Ok(self.seek(index)?.data.clone())
    }

    fn read_samples(&mut self, index: usize) -> Result<Samples> {
        Ok(self.seek(index)?.samples.clone())
    }

    fn write_data(&mut self, _index: usize, _data: &Data) -> Result<()> {
        bail!("pipe traces are read-only")
    }

    fn write_samples(&mut self, _index: usize, _samples: &Samples) -> Result<()> {
        bail!("pipe traces are read-only")
    }

    fn is_pipe(&self) -> bool {
        true
    }
}
