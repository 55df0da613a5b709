//! Best-effort progress accounting.
//!
//! A [`Progress`] is a cheap, cloneable handle. All clones share one atomic
//! counter, so workers on other threads can tick the same total concurrently.
//! Ticks never block and never fail; a disabled handle ignores them.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Shared {
    total: u64,
    done: AtomicU64,
    bar: Option<ProgressBar>,
}

/// Shared progress sink (possibly disabled).
#[derive(Clone, Debug, Default)]
pub struct Progress {
    inner: Option<Arc<Shared>>,
}

impl Progress {
    /// A sink that ignores every update.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { inner: None }
    }

    /// Counter only, nothing drawn.
    #[must_use]
    pub fn counter(total: u64) -> Self {
        Self {
            inner: Some(Arc::new(Shared {
                total,
                done: AtomicU64::new(0),
                bar: None,
            })),
        }
    }

    /// Counter rendered as a progress bar on stderr (hidden when stderr is not
    /// a terminal).
    #[must_use]
    pub fn bar(total: u64, label: &str) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        bar.set_message(label.to_owned());
        Self {
            inner: Some(Arc::new(Shared {
                total,
                done: AtomicU64::new(0),
                bar: Some(bar),
            })),
        }
    }

    /// Pick a sink for a batch: disabled for pipes or when not wanted.
    #[must_use]
    pub fn for_batch(total: u64, enabled: bool, pipe: bool, label: &str) -> Self {
        if pipe || !enabled {
            Self::disabled()
        } else {
            Self::bar(total, label)
        }
    }

    /// Whether updates are recorded at all.
    #[inline]
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Advance by `n`.
    #[inline]
    pub fn tick(&self, n: u64) {
        if let Some(s) = &self.inner {
            let pos = s.done.fetch_add(n, Ordering::Relaxed) + n;
            if let Some(bar) = &s.bar {
                // Concurrent ticks may land out of order; last write wins.
                bar.set_position(pos.min(s.total));
            }
        }
    }

    /// Current count (0 when disabled).
    #[must_use]
    pub fn position(&self) -> u64 {
        self.inner
            .as_ref()
            .map_or(0, |s| s.done.load(Ordering::Relaxed))
    }

    /// Declared total (0 when disabled).
    #[must_use]
    pub fn total(&self) -> u64 {
        self.inner.as_ref().map_or(0, |s| s.total)
    }

    /// Close the bar, if any.
    pub fn finish(&self) {
        if let Some(bar) = self.inner.as_ref().and_then(|s| s.bar.as_ref()) {
            bar.finish_and_clear();
        }
    }
}
