//! Batch results returned by the single entry point `read_batch`.

use crate::matrix::{DataMatrix, Matrix, SampleMatrix};
use serde::{Deserialize, Serialize};

/// Dense matrices of every valid row in a range (rows = traces).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Materialized {
    /// Data matrix, one row per kept trace.
    pub data: DataMatrix,
    /// Sample matrix, one row per kept trace.
    pub samples: SampleMatrix,
}

impl Materialized {
    /// Result of a range without any valid row: two `0 x 0` matrices.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            data: DataMatrix::U8(Matrix::empty()),
            samples: SampleMatrix::F32(Matrix::empty()),
        }
    }

    /// Number of kept rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.data.rows()
    }
}

/// What a batch produced.
#[derive(Clone, Debug, PartialEq)]
pub enum Batch<S> {
    /// No aggregator attached: dense matrices.
    Matrices(Materialized),
    /// Aggregator attached: its merged statistic.
    Statistic(S),
}

impl<S> Batch<S> {
    /// The matrices, if this was a materialization.
    #[must_use]
    pub fn into_matrices(self) -> Option<Materialized> {
        match self {
            Self::Matrices(m) => Some(m),
            Self::Statistic(_) => None,
        }
    }

    /// The statistic, if this was an aggregation.
    #[must_use]
    pub fn into_statistic(self) -> Option<S> {
        match self {
            Self::Matrices(_) => None,
            Self::Statistic(s) => Some(s),
        }
    }
}

/// Batch output plus end-of-stream flag.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchResult<S> {
    /// Matrices or statistic.
    pub batch: Batch<S>,
    /// The range reached the end of the trace.
    pub eof: bool,
}
