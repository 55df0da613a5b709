//! Batch reader behaviour through the public `Trace::read_batch` entry point.
//!
//! Covers both strategies:
//! - **materialization** (no aggregator): invalid rows are excluded, the kept
//!   count drives `traces_returned`, bit samples come back packed;
//! - **aggregation** (aggregator attached): the statistic flows back and the
//!   consumed row count is accounted the same way.

use proptest::prelude::*;
use scatrace_core::pass::{sample_pass, SkipRows};
use scatrace_core::{
    Aggregator, Batch, BitMatrix, Data, DataMatrix, Matrix, MemorySource, Progress, ReadOptions,
    SampleMatrix, Samples, Trace, TraceError, TraceStore, ValidityKind,
};
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;

fn quiet() -> ReadOptions {
    ReadOptions {
        progress: false,
        ..ReadOptions::default()
    }
}

/// `n` rows; row `i` has data `[i, i+1]` and samples `[i, 2i, 3i]`, except
/// rows in `empty_samples` whose samples are empty.
fn gap_source(n: usize, empty_samples: &BTreeSet<usize>) -> MemorySource {
    MemorySource::from_rows((0..n).map(|i| {
        let samples = if empty_samples.contains(&i) {
            Vec::new()
        } else {
            vec![i as f32, (2 * i) as f32, (3 * i) as f32]
        };
        (Data::U8(vec![i as u8, i as u8 + 1]), Samples::F32(samples))
    }))
}

fn trace_with_gaps(n: usize, empty_samples: &BTreeSet<usize>) -> Trace {
    Trace::new(gap_source(n, empty_samples)).with_options(quiet())
}

#[test]
fn three_gaps_in_ten_rows_leave_seven() {
    let gaps: BTreeSet<usize> = [2, 5, 9].into_iter().collect();
    let mut t = trace_with_gaps(10, &gaps);
    t.store_mut()
        .data_passes_mut()
        .push_back(scatrace_core::pass::data_pass("identity", |d| d));
    t.store_mut()
        .sample_passes_mut()
        .push_back(sample_pass("identity", |s, _| s));

    let out = t.read_batch(0..10).unwrap();
    assert!(out.eof);
    let m = out.batch.into_matrices().unwrap();
    assert_eq!(m.rows(), 7);
    assert_eq!(t.traces_returned(), 7);

    let DataMatrix::U8(d) = &m.data else {
        panic!("byte data expected");
    };
    let firsts: Vec<u8> = (0..d.rows()).map(|r| d.row(r)[0]).collect();
    assert_eq!(firsts, vec![0, 1, 3, 4, 6, 7, 8]);
    let SampleMatrix::F32(s) = &m.samples else {
        panic!("f32 samples expected");
    };
    assert_eq!((s.rows(), s.cols()), (7, 3));
    assert_eq!(s.row(2), &[3.0, 6.0, 9.0]);
}

#[test]
fn bool_samples_are_packed_and_round_trip() {
    let bits: Vec<Vec<bool>> = (0..5)
        .map(|i| (0..13).map(|j| (i * 13 + j) % 3 == 0).collect())
        .collect();
    let src = MemorySource::from_rows(
        bits.iter()
            .enumerate()
            .map(|(i, b)| (Data::U8(vec![i as u8]), Samples::Bool(b.clone()))),
    );
    let mut t: Trace = Trace::new(src).with_options(quiet());
    let m = t.read_batch(0..5).unwrap().batch.into_matrices().unwrap();
    let SampleMatrix::Bits(packed) = m.samples else {
        panic!("bool samples must be bit-packed");
    };
    let expected = Matrix::from_vec(5, 13, bits.concat()).unwrap();
    assert_eq!(packed.to_bools(), expected);
    assert_eq!(packed, BitMatrix::from_bools(&expected));
    assert_eq!(packed.words().len(), 2);
}

#[test]
fn traces_returned_sums_over_disjoint_batches_and_resets() {
    let gaps: BTreeSet<usize> = [1, 6].into_iter().collect();
    let mut t = trace_with_gaps(8, &gaps);
    let a = t.read_batch(0..4).unwrap();
    assert!(!a.eof);
    assert_eq!(t.traces_returned(), 3);
    let b = t.read_batch(4..8).unwrap();
    assert!(b.eof);
    assert_eq!(t.traces_returned(), 6);
    t.reset();
    assert_eq!(t.traces_returned(), 0);
}

#[test]
fn first_valid_on_all_empty_data_is_not_found() {
    let src = MemorySource::from_rows((0..4).map(|_| (Data::U8(vec![]), Samples::F64(vec![1.0]))));
    let mut t: Trace = Trace::new(src);
    let err = t.first_valid(ValidityKind::NonzeroDataSamples).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TraceError>(),
        Some(TraceError::NotFound {
            kind: ValidityKind::NonzeroDataSamples
        })
    ));
    assert!(err.to_string().contains("NonzeroDataSamples"));
}

#[test]
fn mismatched_row_length_is_a_shape_error() {
    let src = MemorySource::from_rows([
        (Data::U8(vec![1]), Samples::F32(vec![1.0, 2.0])),
        (Data::U8(vec![2]), Samples::F32(vec![1.0])),
    ]);
    let mut t: Trace = Trace::new(src).with_options(quiet());
    let err = t.read_batch(0..2).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TraceError>(),
        Some(TraceError::RowShape { index: 1, .. })
    ));
}

/* ----------------------------- aggregation path ----------------------------- */

/// Sums the first sample of each valid row; counts rows.
#[derive(Clone, Debug, Default, PartialEq)]
struct FirstSampleSum {
    sum: f64,
    n: usize,
}

impl Aggregator for FirstSampleSum {
    type Output = (f64, usize);

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn add(
        &mut self,
        store: &mut TraceStore,
        range: Range<usize>,
        progress: &Progress,
    ) -> anyhow::Result<usize> {
        let mut added = 0;
        for item in store.rows(range, progress) {
            let (_, row) = item?;
            self.sum += row.samples.get_f64(0).unwrap_or(0.0);
            self.n += 1;
            added += 1;
        }
        Ok(added)
    }

    fn get(&self) -> anyhow::Result<Self::Output> {
        Ok((self.sum, self.n))
    }

    fn merge(&mut self, other: &Self) -> anyhow::Result<()> {
        self.sum += other.sum;
        self.n += other.n;
        Ok(())
    }
}

#[test]
fn attached_aggregator_takes_the_statistic_path() {
    let gaps: BTreeSet<usize> = [0].into_iter().collect();
    let src = MemorySource::from_rows((0..5).map(|i| {
        let s = if gaps.contains(&i) { vec![] } else { vec![i as f32] };
        (Data::U8(vec![1]), Samples::F32(s))
    }));
    let mut t: Trace<FirstSampleSum> = Trace::new(src).with_options(quiet());
    assert!(t.attach(FirstSampleSum::default()).is_none());

    let out = t.read_batch(0..3).unwrap();
    assert_eq!(out.batch, Batch::Statistic((3.0, 2)));
    // Accumulates across calls until reset.
    let out = t.read_batch(3..5).unwrap();
    assert_eq!(out.batch.into_statistic(), Some((10.0, 4)));
    assert_eq!(t.traces_returned(), 4);

    t.reset();
    assert_eq!(t.post_processor(), Some(&FirstSampleSum::default()));
    assert_eq!(t.traces_returned(), 0);

    assert!(t.detach().is_some());
    assert!(t.read_batch(0..5).unwrap().batch.into_matrices().is_some());
}

#[test]
fn skip_rows_pass_is_honoured_by_aggregators() {
    let src = MemorySource::from_rows((0..6).map(|i| (Data::U8(vec![0]), Samples::F64(vec![i as f64]))));
    let mut t: Trace<FirstSampleSum> = Trace::new(src).with_options(quiet());
    t.store_mut()
        .sample_passes_mut()
        .push_back(Arc::new(SkipRows([5usize].into_iter().collect())));
    t.attach(FirstSampleSum::default());
    let s = t.read_batch(0..6).unwrap().batch.into_statistic().unwrap();
    assert_eq!(s, (10.0, 5));
}

/// `FirstSampleSum` that errors once it reaches row `fail_at`.
#[derive(Clone, Debug, Default, PartialEq)]
struct FailingSum {
    inner: FirstSampleSum,
    fail_at: usize,
}

impl Aggregator for FailingSum {
    type Output = (f64, usize);

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn add(
        &mut self,
        store: &mut TraceStore,
        range: Range<usize>,
        progress: &Progress,
    ) -> anyhow::Result<usize> {
        if range.contains(&self.fail_at) {
            // Consume the rows before the failing one first.
            self.inner.add(store, range.start..self.fail_at, progress)?;
            anyhow::bail!("row {} is unreadable", self.fail_at);
        }
        self.inner.add(store, range, progress)
    }

    fn get(&self) -> anyhow::Result<Self::Output> {
        self.inner.get()
    }

    fn merge(&mut self, other: &Self) -> anyhow::Result<()> {
        self.inner.merge(&other.inner)
    }
}

#[test]
fn failed_batch_leaves_aggregator_and_counter_untouched() {
    let mut t: Trace<FailingSum> = Trace::new(gap_source(10, &BTreeSet::new())).with_options(quiet());
    t.attach(FailingSum {
        fail_at: 7,
        ..FailingSum::default()
    });

    t.read_batch(0..2).unwrap();
    assert!(t.read_batch(2..10).is_err());
    assert_eq!(t.traces_returned(), 2);
    // Rows 2..7 were added to a scratch copy that the failure discarded.
    assert_eq!(t.post_processor().unwrap().inner, FirstSampleSum { sum: 1.0, n: 2 });

    let out = t.read_batch(2..5).unwrap();
    assert_eq!(out.batch, Batch::Statistic((10.0, 5)));
    assert_eq!(t.traces_returned(), 5);
}

#[test]
fn staged_rows_count_only_once_committed() {
    let mut t: Trace<FirstSampleSum> =
        Trace::new(gap_source(6, &[3].into_iter().collect())).with_options(quiet());
    t.attach(FirstSampleSum::default());

    let staged = t.stage(&[0..2, 4..6], &Progress::disabled()).unwrap();
    assert_eq!(staged.added(), 4);
    assert_eq!(staged.aggregator(), &FirstSampleSum { sum: 10.0, n: 4 });
    assert_eq!(t.traces_returned(), 0);
    assert_eq!(t.post_processor(), Some(&FirstSampleSum::default()));

    t.commit(staged);
    assert_eq!(t.traces_returned(), 4);
    assert_eq!(t.read_batch(2..4).unwrap().batch, Batch::Statistic((12.0, 5)));
}

proptest! {
    /// Materialization keeps exactly the rows the passes leave valid.
    #[test]
    fn materialize_excludes_exactly_invalid_rows(
        n in 1usize..40,
        gaps in proptest::collection::btree_set(0usize..40, 0..20),
        skip in proptest::collection::btree_set(0usize..40, 0..10),
        lo in 0usize..40,
        len in 0usize..40,
    ) {
        let lo = lo.min(n);
        let hi = (lo + len).min(n);
        let mut t = trace_with_gaps(n, &gaps);
        t.store_mut()
            .sample_passes_mut()
            .push_back(Arc::new(SkipRows(skip.clone())));

        let expected: Vec<usize> = (lo..hi)
            .filter(|i| !gaps.contains(i) && !skip.contains(i))
            .collect();
        let m = t.read_batch(lo..hi).unwrap().batch.into_matrices().unwrap();
        prop_assert_eq!(m.rows(), expected.len());
        prop_assert_eq!(t.traces_returned(), expected.len() as u64);
        if let DataMatrix::U8(d) = &m.data {
            let got: Vec<usize> = (0..d.rows()).map(|r| usize::from(d.row(r)[0])).collect();
            prop_assert_eq!(got, expected);
        } else {
            prop_assert!(m.rows() == 0);
        }
    }
}
