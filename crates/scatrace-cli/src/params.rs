//! Analysis parameters: which kernel to run, over which rows, through which
//! passes.
//!
//! Parameters come from an explicit `--params` file or, failing that, from a
//! sidecar next to the input (`traces.cbor` → `traces.params.toml`). When
//! neither exists the command fails with a configuration error before the
//! trace is opened. TOML is the default format; a `.json` extension selects
//! JSON.

use anyhow::{Context, Result};
use scatrace_core::pass::{DataColumns, SampleWindow, Threshold};
use scatrace_core::{TraceError, TraceStore, WorkSplit};
use scatrace_kernels::KernelKind;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything `aggregate` needs besides the trace itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisParams {
    /// Kernel to run.
    pub kernel: KernelKind,
    /// Rows to process as `[lo, hi)`; whole trace if absent.
    pub range: Option<[usize; 2]>,
    /// Rows per `read_batch` call; whole range in one call if absent.
    pub batch: Option<usize>,
    /// Keep only these sample points, `[lo, hi)`.
    pub sample_window: Option<[usize; 2]>,
    /// Keep only these data columns, in this order.
    pub data_columns: Option<Vec<usize>>,
    /// Turn samples into bits (`sample > threshold`).
    pub threshold: Option<f64>,
    /// How rows are spread over workers.
    pub work_split: WorkSplit,
    /// Worker count; overrides `SCATRACE_WORKERS`.
    pub workers: Option<usize>,
}

fn config_err(msg: String) -> anyhow::Error {
    TraceError::Config(msg).into()
}

impl AnalysisParams {
    /// Sidecar location for `input`: same directory, `<stem>.params.toml`.
    #[must_use]
    pub fn sidecar(input: &Path) -> Option<PathBuf> {
        let stem = input.file_stem()?.to_str()?;
        Some(input.with_file_name(format!("{stem}.params.toml")))
    }

    /// Resolve parameters for `input` (`-` is stdin, which has no sidecar).
    ///
    /// # Errors
    /// [`TraceError::Config`] when nothing usable is found or the file is
    /// malformed.
    pub fn for_input(input: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if input == Path::new("-") {
            return Err(config_err(
                "no analysis parameters for stdin input; pass --params".to_owned(),
            ));
        }
        match Self::sidecar(input) {
            Some(side) if side.is_file() => Self::load(&side),
            Some(side) => Err(config_err(format!(
                "no analysis parameters for {}: pass --params or create {}",
                input.display(),
                side.display()
            ))),
            None => Err(config_err(format!(
                "no analysis parameters for {}: pass --params",
                input.display()
            ))),
        }
    }

    /// Load and validate a parameter file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| config_err(format!("read {}: {e}", path.display())))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let params: Self = if is_json {
            serde_json::from_str(&text)
                .map_err(|e| config_err(format!("parse {}: {e}", path.display())))?
        } else {
            toml::from_str(&text)
                .map_err(|e| config_err(format!("parse {}: {e}", path.display())))?
        };
        params
            .validate()
            .with_context(|| format!("validate {}", path.display()))?;
        Ok(params)
    }

    /// Reject empty ranges/windows and zero counts.
    pub fn validate(&self) -> Result<()> {
        if let Some([lo, hi]) = self.range {
            if lo >= hi {
                return Err(config_err(format!("range [{lo}, {hi}) is empty")));
            }
        }
        if let Some([lo, hi]) = self.sample_window {
            if lo >= hi {
                return Err(config_err(format!("sample_window [{lo}, {hi}) is empty")));
            }
        }
        if self.data_columns.as_ref().is_some_and(Vec::is_empty) {
            return Err(config_err("data_columns selects no column".to_owned()));
        }
        if self.batch == Some(0) {
            return Err(config_err("batch must be positive".to_owned()));
        }
        if self.workers == Some(0) {
            return Err(config_err("workers must be positive".to_owned()));
        }
        if self.threshold.is_some_and(|t| !t.is_finite()) {
            return Err(config_err("threshold must be finite".to_owned()));
        }
        Ok(())
    }

    /// Rows to process for a trace of `len` rows.
    #[must_use]
    pub fn rows(&self, len: usize) -> Range<usize> {
        self.range
            .map_or(0..len, |[lo, hi]| lo.min(len)..hi.min(len))
    }

    /// Install the configured passes on `store` (data: column selection;
    /// samples: window, then threshold).
    pub fn install_passes(&self, store: &mut TraceStore) {
        if let Some(cols) = &self.data_columns {
            store
                .data_passes_mut()
                .push_back(Arc::new(DataColumns(cols.clone())));
        }
        if let Some([lo, hi]) = self.sample_window {
            store
                .sample_passes_mut()
                .push_back(Arc::new(SampleWindow(lo..hi)));
        }
        if let Some(t) = self.threshold {
            store.sample_passes_mut().push_back(Arc::new(Threshold(t)));
        }
    }
}
