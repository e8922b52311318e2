//! Stage reporting for a single conversion
//!
//! Drives an optional spinner with one status line per pipeline stage.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::debug;

pub const STAGE_READING: &str = "Reading .sav file...";
pub const STAGE_COMPLETE: &str = "Conversion complete!";

/// Spinner for the conversion stages; silent when disabled
pub struct ProgressReporter {
    progress_bar: Option<ProgressBar>,
}

impl ProgressReporter {
    pub fn new(enabled: bool) -> Self {
        let progress_bar = enabled.then(|| {
            let pb = ProgressBar::new_spinner();
            let style = ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");
            pb.set_style(style);
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });
        Self { progress_bar }
    }

    pub fn stage(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("{}", message);
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message);
        }
    }

    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_with_message(STAGE_COMPLETE);
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        // Failed conversions leave the last stage on screen
        if let Some(ref pb) = self.progress_bar {
            if !pb.is_finished() {
                pb.abandon();
            }
        }
    }
}

/// Status line for the serialize stage
pub fn writing_stage(format: impl std::fmt::Display) -> String {
    format!("Writing to {}...", format)
}
