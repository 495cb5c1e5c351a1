//! Live status line for the foreground loop
//!
//! On a terminal the training loop gets a spinner whose message is the last
//! finished episode. Off a terminal the bar is hidden and logs are the only
//! progress output.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const TICK: Duration = Duration::from_millis(120);

/// Owns the `MultiProgress` the TTY logger prints through.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

pub type SharedProgress = Arc<ProgressContext>;

impl ProgressContext {
    /// Detects whether stderr is a terminal.
    pub fn new() -> Self {
        Self::with_tty(std::io::stderr().is_terminal())
    }

    pub fn with_tty(is_tty: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Spinner labelled `name`, or a hidden bar off a terminal.
    pub fn loop_line(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} [{elapsed}] {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let pb = self
            .multi
            .add(ProgressBar::new_spinner().with_style(style).with_prefix(name.to_string()));
        pb.enable_steady_tick(TICK);
        pb
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}
