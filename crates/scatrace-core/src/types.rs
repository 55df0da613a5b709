//! Canonical row types shared across the scatrace workspace.
//!
//! A trace row is a pair of vectors: auxiliary `Data` (plaintext/ciphertext
//! like bytes or small scalars) and measured `Samples` (floats, ADC integers
//! or bits). Both are tagged enums so a pass may change the element type of a
//! row between stages.
//!
//! These are re-exported at the crate root so other crates can import via
//! `scatrace_core::Data`, `scatrace_core::Samples`, etc.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a data or sample vector.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// `u8`
    U8,
    /// `u16`
    U16,
    /// `u32`
    U32,
    /// `i16`
    I16,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// Single bit (bit-packed when materialized).
    Bool,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::I16 => "i16",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Bool => "bool",
        };
        f.write_str(s)
    }
}

/// Auxiliary data attached to one trace (bytes or small scalars).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "values", rename_all = "lowercase")]
pub enum Data {
    /// Byte data (the common case: plaintext/ciphertext bytes).
    U8(Vec<u8>),
    /// 16-bit scalars.
    U16(Vec<u16>),
    /// 32-bit scalars.
    U32(Vec<u32>),
}

impl Data {
    /// Number of elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    /// Whether the vector has no elements.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ElementKind {
        match self {
            Self::U8(_) => ElementKind::U8,
            Self::U16(_) => ElementKind::U16,
            Self::U32(_) => ElementKind::U32,
        }
    }

    /// An empty vector of the same element type.
    #[must_use]
    pub const fn empty_like(&self) -> Self {
        match self {
            Self::U8(_) => Self::U8(Vec::new()),
            Self::U16(_) => Self::U16(Vec::new()),
            Self::U32(_) => Self::U32(Vec::new()),
        }
    }

    /// Element `i` widened to `u32`.
    #[inline]
    #[must_use]
    pub fn get_u32(&self, i: usize) -> Option<u32> {
        match self {
            Self::U8(v) => v.get(i).map(|&x| u32::from(x)),
            Self::U16(v) => v.get(i).map(|&x| u32::from(x)),
            Self::U32(v) => v.get(i).copied(),
        }
    }

    /// Keep only the elements at `columns` (in the given order).
    ///
    /// Out-of-range columns are dropped, so a selection that misses every
    /// column yields an empty vector.
    #[must_use]
    pub fn select(&self, columns: &[usize]) -> Self {
        fn pick<T: Copy>(v: &[T], columns: &[usize]) -> Vec<T> {
            columns.iter().filter_map(|&c| v.get(c).copied()).collect()
        }
        match self {
            Self::U8(v) => Self::U8(pick(v, columns)),
            Self::U16(v) => Self::U16(pick(v, columns)),
            Self::U32(v) => Self::U32(pick(v, columns)),
        }
    }
}

/// Measured samples of one trace.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "values", rename_all = "lowercase")]
pub enum Samples {
    /// 8-bit ADC samples.
    U8(Vec<u8>),
    /// 16-bit ADC samples.
    I16(Vec<i16>),
    /// Single precision samples.
    F32(Vec<f32>),
    /// Double precision samples.
    F64(Vec<f64>),
    /// Bit samples.
    Bool(Vec<bool>),
}

impl Samples {
    /// Number of samples.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    /// Whether there are no samples.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ElementKind {
        match self {
            Self::U8(_) => ElementKind::U8,
            Self::I16(_) => ElementKind::I16,
            Self::F32(_) => ElementKind::F32,
            Self::F64(_) => ElementKind::F64,
            Self::Bool(_) => ElementKind::Bool,
        }
    }

    /// An empty vector of the same element type.
    #[must_use]
    pub const fn empty_like(&self) -> Self {
        match self {
            Self::U8(_) => Self::U8(Vec::new()),
            Self::I16(_) => Self::I16(Vec::new()),
            Self::F32(_) => Self::F32(Vec::new()),
            Self::F64(_) => Self::F64(Vec::new()),
            Self::Bool(_) => Self::Bool(Vec::new()),
        }
    }

    /// Sample `i` widened to `f64` (`true` ⇒ 1.0).
    #[inline]
    #[must_use]
    pub fn get_f64(&self, i: usize) -> Option<f64> {
        match self {
            Self::U8(v) => v.get(i).map(|&x| f64::from(x)),
            Self::I16(v) => v.get(i).map(|&x| f64::from(x)),
            Self::F32(v) => v.get(i).map(|&x| f64::from(x)),
            Self::F64(v) => v.get(i).copied(),
            Self::Bool(v) => v.get(i).map(|&x| if x { 1.0 } else { 0.0 }),
        }
    }

    /// All samples widened to `f64`.
    #[must_use]
    pub fn to_f64(&self) -> Vec<f64> {
        (0..self.len()).filter_map(|i| self.get_f64(i)).collect()
    }

    /// Keep the samples in `[lo, hi)`, clamped to the vector length.
    #[must_use]
    pub fn window(&self, lo: usize, hi: usize) -> Self {
        fn cut<T: Copy>(v: &[T], lo: usize, hi: usize) -> Vec<T> {
            let hi = hi.min(v.len());
            let lo = lo.min(hi);
            v[lo..hi].to_vec()
        }
        match self {
            Self::U8(v) => Self::U8(cut(v, lo, hi)),
            Self::I16(v) => Self::I16(cut(v, lo, hi)),
            Self::F32(v) => Self::F32(cut(v, lo, hi)),
            Self::F64(v) => Self::F64(cut(v, lo, hi)),
            Self::Bool(v) => Self::Bool(cut(v, lo, hi)),
        }
    }
}

/// One trace as seen through the pass pipeline.
///
/// Either both vectors are non-empty (valid row) or both are empty.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    /// Auxiliary data after data passes.
    pub data: Data,
    /// Samples after sample passes.
    pub samples: Samples,
}

impl Row {
    /// A row is valid iff both vectors are non-empty.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty() && !self.samples.is_empty()
    }
}

/// Which part of a row must be non-empty for `first_valid` to accept it.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValidityKind {
    /// Data must be non-empty.
    NonzeroData,
    /// Samples must be non-empty.
    NonzeroSamples,
    /// Both must be non-empty.
    #[default]
    NonzeroDataSamples,
}

impl ValidityKind {
    /// Whether `(data_len, samples_len)` satisfies this kind.
    #[inline]
    #[must_use]
    pub const fn accepts(self, data_len: usize, samples_len: usize) -> bool {
        match self {
            Self::NonzeroData => data_len > 0,
            Self::NonzeroSamples => samples_len > 0,
            Self::NonzeroDataSamples => data_len > 0 && samples_len > 0,
        }
    }
}

impl fmt::Display for ValidityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NonzeroData => "NonzeroData",
            Self::NonzeroSamples => "NonzeroSamples",
            Self::NonzeroDataSamples => "NonzeroDataSamples",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ValidityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nonzerodata" | "data" => Ok(Self::NonzeroData),
            "nonzerosamples" | "samples" => Ok(Self::NonzeroSamples),
            "nonzerodatasamples" | "both" => Ok(Self::NonzeroDataSamples),
            other => Err(format!("unknown validity kind: {other}")),
        }
    }
}
