//! Read-time options.
//!
//! Defaults suit interactive use (progress bar on, one worker). Drivers may
//! override them through the environment:
//!
//! | Variable | Meaning |
//! |---|---|
//! | `SCATRACE_PROGRESS` | `0`/`false`/`off` disables progress bars |
//! | `SCATRACE_WORKERS` | worker count for distributed batches |
//! | `SCATRACE_VALIDITY` | default validity kind for `first_valid` |

use crate::error::TraceError;
use crate::types::ValidityKind;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Options consulted by `read_batch` and friends.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReadOptions {
    /// Draw a progress bar (ignored for pipes).
    pub progress: bool,
    /// Number of workers a driver should spawn for distributed batches.
    pub workers: usize,
    /// Default validity kind for first-valid lookups.
    pub validity: ValidityKind,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            progress: true,
            workers: 1,
            validity: ValidityKind::default(),
        }
    }
}

impl ReadOptions {
    /// Defaults overridden by `SCATRACE_*` environment variables.
    ///
    /// # Errors
    /// [`TraceError::Config`] if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`Self::from_env`] with an explicit variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Self::default();
        if let Some(v) = lookup("SCATRACE_PROGRESS") {
            opts.progress = match v.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "off" | "no" => false,
                "1" | "true" | "on" | "yes" => true,
                other => {
                    return Err(
                        TraceError::Config(format!("SCATRACE_PROGRESS: bad value {other:?}")).into(),
                    )
                }
            };
        }
        if let Some(v) = lookup("SCATRACE_WORKERS") {
            opts.workers = v
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| TraceError::Config(format!("SCATRACE_WORKERS: bad value {v:?}")))?;
        }
        if let Some(v) = lookup("SCATRACE_VALIDITY") {
            opts.validity = v
                .parse()
                .map_err(|e: String| TraceError::Config(format!("SCATRACE_VALIDITY: {e}")))?;
        }
        Ok(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn env_overrides_defaults() {
        let o = ReadOptions::from_lookup(lookup(&[
            ("SCATRACE_PROGRESS", "off"),
            ("SCATRACE_WORKERS", "4"),
            ("SCATRACE_VALIDITY", "data"),
        ]))
        .unwrap();
        assert!(!o.progress);
        assert_eq!(o.workers, 4);
        assert_eq!(o.validity, ValidityKind::NonzeroData);
    }

    #[test]
    fn bad_values_are_config_errors() {
        let err = ReadOptions::from_lookup(lookup(&[("SCATRACE_WORKERS", "0")])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TraceError>(),
            Some(TraceError::Config(_))
        ));
        assert!(ReadOptions::from_lookup(lookup(&[])).unwrap() == ReadOptions::default());
    }
}
