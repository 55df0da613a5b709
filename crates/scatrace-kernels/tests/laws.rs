//! Algebraic laws every aggregator must satisfy, checked on both kernels.
//!
//! - reset-then-feed equals fresh-then-feed;
//! - one call over a range equals calls over a disjoint partition in any order;
//! - merging instances fed the parts equals one instance fed the whole.

use proptest::prelude::*;
use scatrace_core::{
    Aggregator, Data, MemorySource, Progress, Samples, TraceStore, WorkSplit,
};
use scatrace_kernels::{CondAvg, Kernel, KernelKind, KernelOutput, MeanVar, PointStats};

/// Integer-valued samples keep CondAvg sums exact.
fn rows_strategy() -> impl Strategy<Value = Vec<(Vec<u8>, Vec<i16>)>> {
    (1usize..4, 1usize..6).prop_flat_map(|(dl, sl)| {
        proptest::collection::vec(
            (
                proptest::collection::vec(0u8..4, dl),
                prop_oneof![
                    3 => proptest::collection::vec(-50i16..50, sl),
                    1 => Just(Vec::new()),
                ],
            ),
            1..40,
        )
    })
}

fn store(rows: &[(Vec<u8>, Vec<i16>)]) -> TraceStore {
    TraceStore::new(MemorySource::from_rows(
        rows.iter()
            .map(|(d, s)| (Data::U8(d.clone()), Samples::I16(s.clone()))),
    ))
}

fn feed<A: Aggregator>(agg: &mut A, rows: &[(Vec<u8>, Vec<i16>)], ranges: &[std::ops::Range<usize>]) -> usize {
    let mut s = store(rows);
    ranges
        .iter()
        .map(|r| agg.add(&mut s, r.clone(), &Progress::disabled()).unwrap())
        .sum()
}

fn close(a: &PointStats, b: &PointStats) -> bool {
    a.count == b.count
        && a.mean.len() == b.mean.len()
        && a.mean.iter().zip(&b.mean).all(|(x, y)| (x - y).abs() < 1e-6)
        && a.variance.iter().zip(&b.variance).all(|(x, y)| (x - y).abs() < 1e-6)
}

proptest! {
    #[test]
    fn cond_avg_reset_is_fresh(rows in rows_strategy()) {
        let n = rows.len();
        let mut used = CondAvg::new();
        feed(&mut used, &rows, &[0..n]);
        used.reset();
        prop_assert_eq!(&used, &CondAvg::new());
        feed(&mut used, &rows, &[0..n]);
        let mut fresh = CondAvg::new();
        feed(&mut fresh, &rows, &[0..n]);
        prop_assert_eq!(used.get().unwrap(), fresh.get().unwrap());
    }

    #[test]
    fn cond_avg_partition_order_and_merge(rows in rows_strategy(), cut in 0usize..40) {
        let n = rows.len();
        let cut = cut.min(n);

        let mut whole = CondAvg::new();
        let added = feed(&mut whole, &rows, &[0..n]);
        prop_assert_eq!(added, rows.iter().filter(|(_, s)| !s.is_empty()).count());

        let mut swapped = CondAvg::new();
        feed(&mut swapped, &rows, &[cut..n, 0..cut]);
        prop_assert_eq!(whole.get().unwrap(), swapped.get().unwrap());

        let mut left = CondAvg::new();
        feed(&mut left, &rows, &[0..cut]);
        let mut right = CondAvg::new();
        feed(&mut right, &rows, &[cut..n]);
        let mut lr = left.clone();
        lr.merge(&right).unwrap();
        let mut rl = right;
        rl.merge(&left).unwrap();
        prop_assert_eq!(whole.get().unwrap(), lr.get().unwrap());
        prop_assert_eq!(lr.get().unwrap(), rl.get().unwrap());
    }

    #[test]
    fn mean_var_partition_order_and_merge(rows in rows_strategy(), a in 0usize..40, b in 0usize..40) {
        let n = rows.len();
        let (lo, hi) = (a.min(b).min(n), a.max(b).min(n));

        let mut whole = MeanVar::new();
        feed(&mut whole, &rows, &[0..n]);

        let mut reordered = MeanVar::new();
        feed(&mut reordered, &rows, &[hi..n, lo..hi, 0..lo]);
        prop_assert!(close(&whole.get().unwrap(), &reordered.get().unwrap()));

        // ((p0 + p1) + p2) vs (p0 + (p1 + p2))
        let parts: Vec<MeanVar> = [0..lo, lo..hi, hi..n]
            .into_iter()
            .map(|r| {
                let mut k = MeanVar::new();
                feed(&mut k, &rows, &[r]);
                k
            })
            .collect();
        let mut left = parts[0].clone();
        left.merge(&parts[1]).unwrap();
        left.merge(&parts[2]).unwrap();
        let mut tail = parts[1].clone();
        tail.merge(&parts[2]).unwrap();
        let mut right = parts[0].clone();
        right.merge(&tail).unwrap();
        prop_assert!(close(&whole.get().unwrap(), &left.get().unwrap()));
        prop_assert!(close(&left.get().unwrap(), &right.get().unwrap()));
    }
}

#[test]
fn kernel_enum_delegates() {
    let rows: Vec<(Vec<u8>, Vec<i16>)> = (0..6u8)
        .map(|i| (vec![i % 2], vec![i16::from(i), 1]))
        .collect();
    let mut k = Kernel::new(KernelKind::CondAvg, WorkSplit::Interleaved { block: 2 });
    assert_eq!(k.work_split(), WorkSplit::Interleaved { block: 2 });
    assert_eq!(feed(&mut k, &rows, &[0..6]), 6);
    let KernelOutput::CondAvg { classes } = k.get().unwrap() else {
        panic!("cond-avg output expected");
    };
    assert_eq!(classes.len(), 2);
    assert_eq!(classes[0].mean, vec![2.0, 1.0]);
    assert_eq!(classes[1].mean, vec![3.0, 1.0]);
}
