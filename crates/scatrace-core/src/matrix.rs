//! Dense row-major matrices produced by direct materialization.
//!
//! Rows are traces, columns are features. Numeric element types use a plain
//! [`Matrix<T>`]; bit samples use the packed [`BitMatrix`] so a million
//! traces of a few thousand bits stay small.
//!
//! The `*Buffer` types are the growable scratch space the batch reader fills
//! row by row: capacity is planned from an upper bound, rows are appended
//! contiguously, and `finish` shrinks to the rows actually kept.

use crate::error::TraceError;
use crate::types::{Data, ElementKind, Samples};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Row-major dense matrix.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    values: Vec<T>,
}

impl<T> Matrix<T> {
    /// Wrap `values` (row-major, `rows * cols` long).
    ///
    /// # Errors
    /// Fails if `values.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, values: Vec<T>) -> Result<Self> {
        if values.len() != rows.saturating_mul(cols) {
            anyhow::bail!(
                "matrix shape {rows}x{cols} does not match {} values",
                values.len()
            );
        }
        Ok(Self { rows, cols, values })
    }

    /// A `0 x 0` matrix.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            rows: 0,
            cols: 0,
            values: Vec::new(),
        }
    }

    /// Number of rows (traces).
    #[inline]
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (features).
    #[inline]
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Row `r`.
    ///
    /// # Panics
    /// Panics if `r >= rows()`.
    #[inline]
    #[must_use]
    pub fn row(&self, r: usize) -> &[T] {
        &self.values[r * self.cols..(r + 1) * self.cols]
    }

    /// Element at `(r, c)`.
    #[inline]
    #[must_use]
    pub fn get(&self, r: usize, c: usize) -> Option<&T> {
        if r < self.rows && c < self.cols {
            self.values.get(r * self.cols + c)
        } else {
            None
        }
    }

    /// Backing storage, row-major.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    /// Consume into the row-major storage.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.values
    }
}

/// Bit-packed row-major boolean matrix.
///
/// Bit `r * cols + c` lives in word `(r * cols + c) / 64`. Padding bits past
/// `rows * cols` are always zero.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BitMatrix {
    rows: usize,
    cols: usize,
    words: Vec<u64>,
}

impl BitMatrix {
    /// Pack a row-major boolean matrix.
    #[must_use]
    pub fn from_bools(m: &Matrix<bool>) -> Self {
        let mut buf = BitBuffer::with_capacity(m.as_slice().len());
        buf.extend(m.as_slice());
        Self {
            rows: m.rows(),
            cols: m.cols(),
            words: buf.into_words(),
        }
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Bit at `(r, c)`.
    #[inline]
    #[must_use]
    pub fn get(&self, r: usize, c: usize) -> Option<bool> {
        if r >= self.rows || c >= self.cols {
            return None;
        }
        let bit = r * self.cols + c;
        self.words.get(bit / 64).map(|w| (w >> (bit % 64)) & 1 == 1)
    }

    /// Row `r` unpacked.
    #[must_use]
    pub fn row(&self, r: usize) -> Vec<bool> {
        (0..self.cols).filter_map(|c| self.get(r, c)).collect()
    }

    /// Number of set bits.
    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Packed words.
    #[inline]
    #[must_use]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Unpack into a dense boolean matrix.
    #[must_use]
    pub fn to_bools(&self) -> Matrix<bool> {
        let n = self.rows * self.cols;
        let values = (0..n)
            .map(|bit| (self.words[bit / 64] >> (bit % 64)) & 1 == 1)
            .collect();
        Matrix {
            rows: self.rows,
            cols: self.cols,
            values,
        }
    }
}

/// Growable bit storage backing [`BitMatrix`].
#[derive(Clone, Debug, Default)]
struct BitBuffer {
    words: Vec<u64>,
    len: usize,
}

impl BitBuffer {
    fn with_capacity(bits: usize) -> Self {
        Self {
            words: Vec::with_capacity(bits.div_ceil(64)),
            len: 0,
        }
    }

    fn extend(&mut self, bits: &[bool]) {
        for &b in bits {
            let w = self.len / 64;
            if w == self.words.len() {
                self.words.push(0);
            }
            if b {
                self.words[w] |= 1u64 << (self.len % 64);
            }
            self.len += 1;
        }
    }

    fn into_words(mut self) -> Vec<u64> {
        self.words.truncate(self.len.div_ceil(64));
        self.words.shrink_to_fit();
        self.words
    }
}

/// Materialized data matrix.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DataMatrix {
    /// Byte data.
    U8(Matrix<u8>),
    /// 16-bit scalars.
    U16(Matrix<u16>),
    /// 32-bit scalars.
    U32(Matrix<u32>),
}

impl DataMatrix {
    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        match self {
            Self::U8(m) => m.rows(),
            Self::U16(m) => m.rows(),
            Self::U32(m) => m.rows(),
        }
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        match self {
            Self::U8(m) => m.cols(),
            Self::U16(m) => m.cols(),
            Self::U32(m) => m.cols(),
        }
    }
}

/// Materialized sample matrix.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SampleMatrix {
    /// 8-bit ADC samples.
    U8(Matrix<u8>),
    /// 16-bit ADC samples.
    I16(Matrix<i16>),
    /// Single precision.
    F32(Matrix<f32>),
    /// Double precision.
    F64(Matrix<f64>),
    /// Bit samples, packed.
    Bits(BitMatrix),
}

impl SampleMatrix {
    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        match self {
            Self::U8(m) => m.rows(),
            Self::I16(m) => m.rows(),
            Self::F32(m) => m.rows(),
            Self::F64(m) => m.rows(),
            Self::Bits(m) => m.rows(),
        }
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        match self {
            Self::U8(m) => m.cols(),
            Self::I16(m) => m.cols(),
            Self::F32(m) => m.cols(),
            Self::F64(m) => m.cols(),
            Self::Bits(m) => m.cols(),
        }
    }
}

/* --------------------------------- buffers --------------------------------- */

/// Scratch space for materialized data rows.
#[derive(Debug)]
pub(crate) struct DataBuffer {
    row_len: usize,
    values: DataValues,
}

#[derive(Debug)]
enum DataValues {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl DataBuffer {
    /// Plan storage for rows shaped like `first`, `rows_hint` rows at most.
    pub(crate) fn for_row(first: &Data, rows_hint: usize) -> Self {
        let cap = first.len().saturating_mul(rows_hint);
        let values = match first {
            Data::U8(_) => DataValues::U8(Vec::with_capacity(cap)),
            Data::U16(_) => DataValues::U16(Vec::with_capacity(cap)),
            Data::U32(_) => DataValues::U32(Vec::with_capacity(cap)),
        };
        Self {
            row_len: first.len(),
            values,
        }
    }

    fn kind(&self) -> ElementKind {
        match self.values {
            DataValues::U8(_) => ElementKind::U8,
            DataValues::U16(_) => ElementKind::U16,
            DataValues::U32(_) => ElementKind::U32,
        }
    }

    /// Append one row; it must match the planned shape.
    pub(crate) fn push(&mut self, index: usize, row: &Data) -> Result<()> {
        let n = self.row_len;
        let expected_kind = self.kind();
        match (&mut self.values, row) {
            (DataValues::U8(buf), Data::U8(v)) if v.len() == n => buf.extend_from_slice(v),
            (DataValues::U16(buf), Data::U16(v)) if v.len() == n => buf.extend_from_slice(v),
            (DataValues::U32(buf), Data::U32(v)) if v.len() == n => buf.extend_from_slice(v),
            _ => {
                return Err(TraceError::RowShape {
                    index,
                    expected_kind,
                    expected_len: n,
                    found_kind: row.kind(),
                    found_len: row.len(),
                }
                .into())
            }
        }
        Ok(())
    }

    /// Shrink to `rows` kept rows and hand out the matrix.
    pub(crate) fn finish(self, rows: usize) -> Result<DataMatrix> {
        fn shrink<T>(mut v: Vec<T>, rows: usize, cols: usize) -> Result<Matrix<T>> {
            v.truncate(rows * cols);
            v.shrink_to_fit();
            Matrix::from_vec(rows, cols, v)
        }
        let cols = self.row_len;
        Ok(match self.values {
            DataValues::U8(v) => DataMatrix::U8(shrink(v, rows, cols)?),
            DataValues::U16(v) => DataMatrix::U16(shrink(v, rows, cols)?),
            DataValues::U32(v) => DataMatrix::U32(shrink(v, rows, cols)?),
        })
    }
}

/// Scratch space for materialized sample rows.
#[derive(Debug)]
pub(crate) struct SampleBuffer {
    row_len: usize,
    values: SampleValues,
}

#[derive(Debug)]
enum SampleValues {
    U8(Vec<u8>),
    I16(Vec<i16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Bits(BitBuffer),
}

impl SampleBuffer {
    /// Plan storage for rows shaped like `first`, `rows_hint` rows at most.
    pub(crate) fn for_row(first: &Samples, rows_hint: usize) -> Self {
        let cap = first.len().saturating_mul(rows_hint);
        let values = match first {
            Samples::U8(_) => SampleValues::U8(Vec::with_capacity(cap)),
            Samples::I16(_) => SampleValues::I16(Vec::with_capacity(cap)),
            Samples::F32(_) => SampleValues::F32(Vec::with_capacity(cap)),
            Samples::F64(_) => SampleValues::F64(Vec::with_capacity(cap)),
            Samples::Bool(_) => SampleValues::Bits(BitBuffer::with_capacity(cap)),
        };
        Self {
            row_len: first.len(),
            values,
        }
    }

    fn kind(&self) -> ElementKind {
        match self.values {
            SampleValues::U8(_) => ElementKind::U8,
            SampleValues::I16(_) => ElementKind::I16,
            SampleValues::F32(_) => ElementKind::F32,
            SampleValues::F64(_) => ElementKind::F64,
            SampleValues::Bits(_) => ElementKind::Bool,
        }
    }

    /// Append one row; it must match the planned shape.
    pub(crate) fn push(&mut self, index: usize, row: &Samples) -> Result<()> {
        let n = self.row_len;
        let expected_kind = self.kind();
        match (&mut self.values, row) {
            (SampleValues::U8(buf), Samples::U8(v)) if v.len() == n => buf.extend_from_slice(v),
            (SampleValues::I16(buf), Samples::I16(v)) if v.len() == n => buf.extend_from_slice(v),
            (SampleValues::F32(buf), Samples::F32(v)) if v.len() == n => buf.extend_from_slice(v),
            (SampleValues::F64(buf), Samples::F64(v)) if v.len() == n => buf.extend_from_slice(v),
            (SampleValues::Bits(buf), Samples::Bool(v)) if v.len() == n => buf.extend(v),
            _ => {
                return Err(TraceError::RowShape {
                    index,
                    expected_kind,
                    expected_len: n,
                    found_kind: row.kind(),
                    found_len: row.len(),
                }
                .into())
            }
        }
        Ok(())
    }

    /// Shrink to `rows` kept rows and hand out the matrix.
    pub(crate) fn finish(self, rows: usize) -> Result<SampleMatrix> {
        fn shrink<T>(mut v: Vec<T>, rows: usize, cols: usize) -> Result<Matrix<T>> {
            v.truncate(rows * cols);
            v.shrink_to_fit();
            Matrix::from_vec(rows, cols, v)
        }
        let cols = self.row_len;
        Ok(match self.values {
            SampleValues::U8(v) => SampleMatrix::U8(shrink(v, rows, cols)?),
            SampleValues::I16(v) => SampleMatrix::I16(shrink(v, rows, cols)?),
            SampleValues::F32(v) => SampleMatrix::F32(shrink(v, rows, cols)?),
            SampleValues::F64(v) => SampleMatrix::F64(shrink(v, rows, cols)?),
            SampleValues::Bits(mut b) => {
                b.len = b.len.min(rows * cols);
                SampleMatrix::Bits(BitMatrix {
                    rows,
                    cols,
                    words: b.into_words(),
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_matrix_packs_and_unpacks() {
        let bools: Vec<bool> = (0..3 * 70).map(|i| i % 3 == 0 || i % 7 == 0).collect();
        let m = Matrix::from_vec(3, 70, bools.clone()).unwrap();
        let packed = BitMatrix::from_bools(&m);
        assert_eq!(packed.words().len(), (3 * 70usize).div_ceil(64));
        assert_eq!(packed.to_bools(), m);
        assert_eq!(packed.count_ones(), bools.iter().filter(|b| **b).count());
        assert_eq!(packed.get(1, 0), Some(bools[70]));
        assert_eq!(packed.get(3, 0), None);
    }

    #[test]
    fn buffers_shrink_to_kept_rows() {
        let first = Data::U8(vec![1, 2]);
        let mut buf = DataBuffer::for_row(&first, 10);
        buf.push(0, &first).unwrap();
        buf.push(1, &Data::U8(vec![3, 4])).unwrap();
        let DataMatrix::U8(m) = buf.finish(2).unwrap() else {
            panic!("kind must be preserved");
        };
        assert_eq!((m.rows(), m.cols()), (2, 2));
        assert_eq!(m.row(1), &[3, 4]);
    }

    #[test]
    fn buffers_reject_shape_changes() {
        let first = Samples::F32(vec![1.0, 2.0]);
        let mut buf = SampleBuffer::for_row(&first, 4);
        buf.push(0, &first).unwrap();
        let err = buf.push(5, &Samples::F32(vec![1.0])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TraceError>(),
            Some(TraceError::RowShape { index: 5, expected_len: 2, found_len: 1, .. })
        ));
        assert!(buf.push(6, &Samples::F64(vec![1.0, 2.0])).is_err());
    }
}
