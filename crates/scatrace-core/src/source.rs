//! Raw read/write primitives a trace store is built on.
//!
//! A [`TraceSource`] knows nothing about passes; it only moves raw rows in and
//! out of its backing storage. Concrete file formats live outside this crate;
//! [`MemorySource`] is the in-memory reference implementation.

use crate::error::TraceError;
use crate::types::{Data, Samples};
use anyhow::Result;

/// Backing storage for an indexed sequence of `(data, samples)` rows.
///
/// Implementors should return [`TraceError::IndexOutOfRange`] for indices
/// `>= len()` and must not panic on malformed input.
pub trait TraceSource: Send {
    /// Logical number of rows.
    fn len(&self) -> usize;

    /// Whether the source has no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw auxiliary data of row `index`.
    fn read_data(&mut self, index: usize) -> Result<Data>;

    /// Raw samples of row `index`.
    fn read_samples(&mut self, index: usize) -> Result<Samples>;

    /// Overwrite the raw data of row `index`.
    fn write_data(&mut self, index: usize, data: &Data) -> Result<()>;

    /// Overwrite the raw samples of row `index`.
    fn write_samples(&mut self, index: usize, samples: &Samples) -> Result<()>;

    /// Streaming sources cannot seek backwards or be pre-sized reliably.
    fn is_pipe(&self) -> bool {
        false
    }
}

impl<S: TraceSource + ?Sized> TraceSource for Box<S> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn read_data(&mut self, index: usize) -> Result<Data> {
        (**self).read_data(index)
    }

    fn read_samples(&mut self, index: usize) -> Result<Samples> {
        (**self).read_samples(index)
    }

    fn write_data(&mut self, index: usize, data: &Data) -> Result<()> {
        (**self).write_data(index, data)
    }

    fn write_samples(&mut self, index: usize, samples: &Samples) -> Result<()> {
        (**self).write_samples(index, samples)
    }

    fn is_pipe(&self) -> bool {
        (**self).is_pipe()
    }
}

/// In-memory rows; cheap to clone into several workers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemorySource {
    data: Vec<Data>,
    samples: Vec<Samples>,
}

impl MemorySource {
    /// Build from parallel vectors.
    ///
    /// # Errors
    /// Returns a configuration error if the vectors differ in length.
    pub fn new(data: Vec<Data>, samples: Vec<Samples>) -> Result<Self> {
        if data.len() != samples.len() {
            return Err(TraceError::Config(format!(
                "data rows ({}) and sample rows ({}) differ",
                data.len(),
                samples.len()
            ))
            .into());
        }
        Ok(Self { data, samples })
    }

    /// Build from `(data, samples)` pairs.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (Data, Samples)>,
    {
        let (data, samples) = rows.into_iter().unzip();
        Self { data, samples }
    }

    /// Append a row.
    pub fn push(&mut self, data: Data, samples: Samples) {
        self.data.push(data);
        self.samples.push(samples);
    }

    #[inline]
    fn check(&self, index: usize) -> Result<()> {
        if index < self.data.len() {
            Ok(())
        } else {
            Err(TraceError::IndexOutOfRange {
                index,
                len: self.data.len(),
            }
            .into())
        }
    }
}

impl TraceSource for MemorySource {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn read_data(&mut self, index: usize) -> Result<Data> {
        self.check(index)?;
        Ok(self.data[index].clone())
    }

    fn read_samples(&mut self, index: usize) -> Result<Samples> {
        self.check(index)?;
        Ok(self.samples[index].clone())
    }

    fn write_data(&mut self, index: usize, data: &Data) -> Result<()> {
        self.check(index)?;
        self.data[index] = data.clone();
        Ok(())
    }

    fn write_samples(&mut self, index: usize, samples: &Samples) -> Result<()> {
        self.check(index)?;
        self.samples[index] = samples.clone();
        Ok(())
    }
}
