//! Direct materialization: every valid row of a range into dense matrices.
//!
//! Single-threaded, `O(range)` time and memory. Storage is planned on the
//! first valid row for `row_len * range_len` elements (skipped for pipes,
//! whose rows may never arrive), rows are appended contiguously, and the
//! buffers are shrunk to the rows actually kept.

use crate::batch::Materialized;
use crate::matrix::{DataBuffer, SampleBuffer};
use crate::progress::Progress;
use crate::trace::TraceStore;
use anyhow::Result;
use std::ops::Range;
use tracing::debug;

/// Materialize the valid rows of `range`.
pub(crate) fn materialize(
    store: &mut TraceStore,
    range: Range<usize>,
    progress: &Progress,
) -> Result<Materialized> {
    let rows_hint = if store.is_pipe() { 0 } else { range.len() };
    let scanned = range.len();
    let mut buffers: Option<(DataBuffer, SampleBuffer)> = None;
    let mut kept = 0usize;

    for item in store.rows(range, progress) {
        let (index, row) = item?;
        let (data_buf, sample_buf) = buffers.get_or_insert_with(|| {
            (
                DataBuffer::for_row(&row.data, rows_hint),
                SampleBuffer::for_row(&row.samples, rows_hint),
            )
        });
        data_buf.push(index, &row.data)?;
        sample_buf.push(index, &row.samples)?;
        kept += 1;
    }

    debug!(scanned, kept, "materialize done");
    match buffers {
        None => Ok(Materialized::empty()),
        Some((data_buf, sample_buf)) => Ok(Materialized {
            data: data_buf.finish(kept)?,
            samples: sample_buf.finish(kept)?,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{DataMatrix, SampleMatrix};
    use crate::pass::SkipRows;
    use crate::source::MemorySource;
    use crate::types::{Data, Samples};
    use std::sync::Arc;

    #[test]
    fn no_valid_rows_gives_empty_matrices() {
        let mut store = TraceStore::new(MemorySource::from_rows([(
            Data::U8(vec![]),
            Samples::F64(vec![1.0]),
        )]));
        let m = materialize(&mut store, 0..1, &Progress::disabled()).unwrap();
        assert_eq!(m, Materialized::empty());
    }

    #[test]
    fn kept_rows_are_contiguous_in_order() {
        let mut store = TraceStore::new(MemorySource::from_rows((0..5u8).map(|i| {
            (Data::U16(vec![u16::from(i)]), Samples::I16(vec![i16::from(i), -1]))
        })));
        store
            .sample_passes_mut()
            .push_back(Arc::new(SkipRows([0usize, 3].into_iter().collect())));
        let m = materialize(&mut store, 0..5, &Progress::disabled()).unwrap();
        let DataMatrix::U16(d) = m.data else {
            panic!("data kind preserved");
        };
        let SampleMatrix::I16(s) = m.samples else {
            panic!("sample kind preserved");
        };
        assert_eq!(d.as_slice(), &[1, 2, 4]);
        assert_eq!((s.rows(), s.cols()), (3, 2));
        assert_eq!(s.row(2), &[4, -1]);
    }
}
