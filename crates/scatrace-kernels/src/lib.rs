//! Reference aggregation kernels.
//!
//! These are intentionally small: they exist so the batch reader and the
//! distributed protocol have real statistics to reduce, not to implement any
//! attack. Both kernels read rows through `TraceStore::rows` (so passes
//! apply), tick progress once per scanned index, and merge exactly.
//!
//! - [`CondAvg`]: sample-wise averages grouped by (data column, data value).
//! - [`MeanVar`]: per-point mean and variance (Welford, Chan merge).
//! - [`Kernel`]: either of the above, picked at runtime.

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
#![allow(clippy::cast_precision_loss, clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

/// Conditional averages.
pub mod cond_avg;
/// Runtime-selected kernel.
pub mod kernel;
/// Per-point mean and variance.
pub mod mean_var;

pub use cond_avg::{ClassMean, CondAvg};
pub use kernel::{Kernel, KernelKind, KernelOutput};
pub use mean_var::{MeanVar, PointStats};

use anyhow::Result;
use scatrace_core::{Row, TraceError};

/// Fix the sample width on the first row, reject rows of any other width.
pub(crate) fn check_width(width: &mut Option<usize>, index: usize, row: &Row) -> Result<()> {
    let n = row.samples.len();
    match *width {
        None => {
            *width = Some(n);
            Ok(())
        }
        Some(w) if w == n => Ok(()),
        Some(w) => Err(TraceError::RowShape {
            index,
            expected_kind: row.samples.kind(),
            expected_len: w,
            found_kind: row.samples.kind(),
            found_len: n,
        }
        .into()),
    }
}
