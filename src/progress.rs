//! Execution progress reporting
//!
//! The executor calls back from worker threads; indicatif handles the
//! necessary synchronization.

use converge_document::Address;
use converge_engine::{Action, OpOutcome, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over the planned change count
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    pub fn new(total_changes: usize, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(total_changes as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            bar
        };
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for ConsoleProgress {
    fn op_started(&self, address: &Address, action: &Action) {
        self.bar.set_message(format!("{} {address}", action.verb()));
    }

    fn op_finished(&self, address: &Address, outcome: &OpOutcome) {
        if let OpOutcome::Failed { error } = outcome {
            self.bar.println(format!("✗ {address}: {error}"));
        }
        self.bar.inc(1);
    }
}
