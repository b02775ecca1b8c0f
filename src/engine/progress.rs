//! Progress display for bulk recalculation.
//!
//! Wraps an `indicatif` bar. The bar is hidden when progress is disabled by
//! the caller or through the `CATCALC_NO_PROGRESS` environment variable, so
//! scripted runs produce clean output.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};

use crate::constants::NO_PROGRESS_ENV_VAR;

fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV_VAR).is_some()
}

fn bar_style() -> Option<IndicatifStyle> {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .ok()
        .map(|style| style.progress_chars("━╸━"))
}

/// Progress bar over a known number of items.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// Visible bar of `len` steps, unless progress is disabled.
    #[must_use]
    pub fn new(len: u64) -> Self {
        if is_progress_disabled() {
            return Self::hidden();
        }
        let bar = IndicatifBar::new(len);
        if let Some(style) = bar_style() {
            bar.set_style(style);
        }
        Self {
            inner: bar,
        }
    }

    /// Bar that never draws.
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.inner.set_prefix(prefix.into());
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    pub fn inc(&self, delta: u64) {
        self.inner.inc(delta);
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }
}
