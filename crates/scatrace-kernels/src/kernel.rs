//! Runtime kernel selection for drivers that pick the statistic from config.

use crate::cond_avg::{ClassMean, CondAvg};
use crate::mean_var::{MeanVar, PointStats};
use anyhow::{bail, Result};
use scatrace_core::{Aggregator, Progress, TraceStore, WorkSplit};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Which kernel to run.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum KernelKind {
    /// [`MeanVar`].
    #[default]
    MeanVar,
    /// [`CondAvg`].
    CondAvg,
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MeanVar => "mean-var",
            Self::CondAvg => "cond-avg",
        })
    }
}

impl FromStr for KernelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean-var" | "meanvar" => Ok(Self::MeanVar),
            "cond-avg" | "condavg" => Ok(Self::CondAvg),
            other => Err(format!("unknown kernel: {other} (expected mean-var or cond-avg)")),
        }
    }
}

/// Either reference kernel.
#[derive(Clone, Debug, PartialEq)]
pub enum Kernel {
    /// Per-point mean and variance.
    MeanVar(MeanVar),
    /// Conditional averages.
    CondAvg(CondAvg),
}

impl Kernel {
    /// Fresh kernel of `kind` using `split`.
    #[must_use]
    pub fn new(kind: KernelKind, split: WorkSplit) -> Self {
        match kind {
            KernelKind::MeanVar => Self::MeanVar(MeanVar::new().with_split(split)),
            KernelKind::CondAvg => Self::CondAvg(CondAvg::new().with_split(split)),
        }
    }

    /// Kind of this kernel.
    #[must_use]
    pub const fn kind(&self) -> KernelKind {
        match self {
            Self::MeanVar(_) => KernelKind::MeanVar,
            Self::CondAvg(_) => KernelKind::CondAvg,
        }
    }
}

/// Output of a [`Kernel`], tagged by kernel name.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kernel", rename_all = "kebab-case")]
pub enum KernelOutput {
    /// Mean/variance per point.
    MeanVar(PointStats),
    /// Class means.
    CondAvg {
        /// One entry per (column, value) class.
        classes: Vec<ClassMean>,
    },
}

impl Aggregator for Kernel {
    type Output = KernelOutput;

    fn reset(&mut self) {
        match self {
            Self::MeanVar(k) => k.reset(),
            Self::CondAvg(k) => k.reset(),
        }
    }

    fn add(&mut self, store: &mut TraceStore, range: Range<usize>, progress: &Progress) -> Result<usize> {
        match self {
            Self::MeanVar(k) => k.add(store, range, progress),
            Self::CondAvg(k) => k.add(store, range, progress),
        }
    }

    fn get(&self) -> Result<Self::Output> {
        Ok(match self {
            Self::MeanVar(k) => KernelOutput::MeanVar(k.get()?),
            Self::CondAvg(k) => KernelOutput::CondAvg { classes: k.get()? },
        })
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        match (self, other) {
            (Self::MeanVar(a), Self::MeanVar(b)) => a.merge(b),
            (Self::CondAvg(a), Self::CondAvg(b)) => a.merge(b),
            (a, b) => bail!("cannot merge a {} kernel into a {} kernel", b.kind(), a.kind()),
        }
    }

    fn work_split(&self) -> WorkSplit {
        match self {
            Self::MeanVar(k) => k.work_split(),
            Self::CondAvg(k) => k.work_split(),
        }
    }
}
