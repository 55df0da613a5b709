//! Pass pipeline: ordered, composable transformations on data or samples.
//!
//! A pass receives the current vector (sample passes also receive the row
//! index) and returns a new vector. The first pass that yields an empty vector
//! stops the pipeline and the row is treated as invalid for that index.
//!
//! Passes are shared as `Arc<dyn ..>` values; a [`PassList`] is the mutable,
//! per-trace ordered list they live in.

use crate::error::{PassStage, TraceError};
use crate::types::{Data, Samples};
use anyhow::Result;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Transformation applied to a row's auxiliary data.
pub trait DataPass: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Transform `data`. Returning an empty vector invalidates the row.
    fn apply(&self, data: Data) -> Data;
}

/// Transformation applied to a row's samples.
pub trait SamplePass: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Transform `samples` of row `index`. Returning an empty vector
    /// invalidates the row.
    fn apply(&self, samples: Samples, index: usize) -> Samples;
}

/// Ordered list of passes of one stage.
pub struct PassList<P: ?Sized> {
    stage: PassStage,
    passes: VecDeque<Arc<P>>,
}

impl<P: ?Sized> PassList<P> {
    /// An empty list for `stage`.
    #[must_use]
    pub const fn new(stage: PassStage) -> Self {
        Self {
            stage,
            passes: VecDeque::new(),
        }
    }

    /// Number of passes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Whether the list is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Insert a pass that runs before all others.
    pub fn push_front(&mut self, pass: Arc<P>) {
        self.passes.push_front(pass);
    }

    /// Append a pass that runs after all others.
    pub fn push_back(&mut self, pass: Arc<P>) {
        self.passes.push_back(pass);
    }

    /// Remove the first pass.
    ///
    /// # Errors
    /// [`TraceError::EmptyPassList`] if there is nothing to remove.
    pub fn pop_front(&mut self) -> Result<Arc<P>> {
        self.passes
            .pop_front()
            .ok_or_else(|| TraceError::EmptyPassList { stage: self.stage }.into())
    }

    /// Remove the last pass.
    ///
    /// # Errors
    /// [`TraceError::EmptyPassList`] if there is nothing to remove.
    pub fn pop_back(&mut self) -> Result<Arc<P>> {
        self.passes
            .pop_back()
            .ok_or_else(|| TraceError::EmptyPassList { stage: self.stage }.into())
    }

    /// Drop every pass.
    pub fn clear(&mut self) {
        self.passes.clear();
    }

    /// Passes in application order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<P>> {
        self.passes.iter()
    }
}

impl PassList<dyn DataPass> {
    /// Run all data passes; stops at the first empty result.
    #[must_use]
    pub fn apply(&self, mut data: Data) -> Data {
        for pass in &self.passes {
            data = pass.apply(data);
            if data.is_empty() {
                break;
            }
        }
        data
    }

    /// Pass names in order (for logs).
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.passes.iter().map(|p| p.name().to_owned()).collect()
    }
}

impl PassList<dyn SamplePass> {
    /// Run all sample passes for row `index`; stops at the first empty result.
    #[must_use]
    pub fn apply(&self, mut samples: Samples, index: usize) -> Samples {
        for pass in &self.passes {
            samples = pass.apply(samples, index);
            if samples.is_empty() {
                break;
            }
        }
        samples
    }

    /// Pass names in order (for logs).
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.passes.iter().map(|p| p.name().to_owned()).collect()
    }
}

impl<P: ?Sized> fmt::Debug for PassList<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassList")
            .field("stage", &self.stage)
            .field("len", &self.passes.len())
            .finish()
    }
}

/* ----------------------------- closure adapters ----------------------------- */

struct FnDataPass<F> {
    name: String,
    f: F,
}

impl<F> DataPass for FnDataPass<F>
where
    F: Fn(Data) -> Data + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, data: Data) -> Data {
        (self.f)(data)
    }
}

struct FnSamplePass<F> {
    name: String,
    f: F,
}

impl<F> SamplePass for FnSamplePass<F>
where
    F: Fn(Samples, usize) -> Samples + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, samples: Samples, index: usize) -> Samples {
        (self.f)(samples, index)
    }
}

/// Wrap a closure as a data pass.
pub fn data_pass<F>(name: impl Into<String>, f: F) -> Arc<dyn DataPass>
where
    F: Fn(Data) -> Data + Send + Sync + 'static,
{
    Arc::new(FnDataPass {
        name: name.into(),
        f,
    })
}

/// Wrap a closure as a sample pass.
pub fn sample_pass<F>(name: impl Into<String>, f: F) -> Arc<dyn SamplePass>
where
    F: Fn(Samples, usize) -> Samples + Send + Sync + 'static,
{
    Arc::new(FnSamplePass {
        name: name.into(),
        f,
    })
}

/* ------------------------------ built-in passes ----------------------------- */

/// Keep the samples in a fixed window `[start, end)`.
#[derive(Clone, Debug)]
pub struct SampleWindow(pub Range<usize>);

impl SamplePass for SampleWindow {
    fn name(&self) -> &str {
        "sample-window"
    }

    fn apply(&self, samples: Samples, _index: usize) -> Samples {
        samples.window(self.0.start, self.0.end)
    }
}

/// Keep selected data columns, in the given order.
#[derive(Clone, Debug)]
pub struct DataColumns(pub Vec<usize>);

impl DataPass for DataColumns {
    fn name(&self) -> &str {
        "data-columns"
    }

    fn apply(&self, data: Data) -> Data {
        data.select(&self.0)
    }
}

/// Turn samples into bits: `sample > level`.
#[derive(Clone, Copy, Debug)]
pub struct Threshold(pub f64);

impl SamplePass for Threshold {
    fn name(&self) -> &str {
        "threshold"
    }

    fn apply(&self, samples: Samples, _index: usize) -> Samples {
        Samples::Bool(samples.to_f64().into_iter().map(|x| x > self.0).collect())
    }
}

/// Invalidate a fixed set of rows by index.
#[derive(Clone, Debug, Default)]
pub struct SkipRows(pub BTreeSet<usize>);

impl SamplePass for SkipRows {
    fn name(&self) -> &str {
        "skip-rows"
    }

    fn apply(&self, samples: Samples, index: usize) -> Samples {
        if self.0.contains(&index) {
            samples.empty_like()
        } else {
            samples
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples_list() -> PassList<dyn SamplePass> {
        PassList::new(PassStage::Samples)
    }

    #[test]
    fn applies_in_order_and_front_insertion_runs_first() {
        let mut l = samples_list();
        l.push_back(Arc::new(SampleWindow(1..4)));
        l.push_front(sample_pass("double", |s, _| {
            Samples::F64(s.to_f64().into_iter().map(|x| x * 2.0).collect())
        }));
        let out = l.apply(Samples::I16(vec![1, 2, 3, 4, 5]), 0);
        assert_eq!(out, Samples::F64(vec![4.0, 6.0, 8.0]));
        assert_eq!(l.names(), vec!["double".to_owned(), "sample-window".to_owned()]);
    }

    #[test]
    fn short_circuits_on_empty() {
        let mut l = samples_list();
        l.push_back(Arc::new(SkipRows([3usize].into_iter().collect())));
        l.push_back(sample_pass("must-not-run", |_, _| Samples::F32(vec![9.0])));
        assert!(l.apply(Samples::F32(vec![1.0]), 3).is_empty());
        assert_eq!(l.apply(Samples::F32(vec![1.0]), 2), Samples::F32(vec![9.0]));
    }

    #[test]
    fn element_type_may_change_between_stages() {
        let mut l = samples_list();
        l.push_back(Arc::new(Threshold(0.5)));
        let out = l.apply(Samples::F32(vec![0.1, 0.9]), 0);
        assert_eq!(out, Samples::Bool(vec![false, true]));
    }

    #[test]
    fn pop_from_empty_is_an_error() {
        let mut l: PassList<dyn DataPass> = PassList::new(PassStage::Data);
        let Err(err) = l.pop_back() else {
            panic!("pop from an empty list must fail");
        };
        assert!(matches!(
            err.downcast_ref::<TraceError>(),
            Some(TraceError::EmptyPassList {
                stage: PassStage::Data
            })
        ));
        l.push_back(Arc::new(DataColumns(vec![0])));
        assert!(l.pop_front().is_ok());
        assert!(l.pop_front().is_err());
    }
}
