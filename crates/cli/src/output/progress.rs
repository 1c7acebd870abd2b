//! Progress reporting for transfer batches

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use obs_core::transfer::{Operation, TransferEvent, TransferObserver};

use super::Formatter;

/// Prints per-item lines and drives a progress bar for multi-item batches
pub struct ProgressObserver {
    formatter: Formatter,
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressObserver {
    pub fn new(formatter: Formatter) -> Self {
        Self {
            formatter,
            bar: Mutex::new(None),
        }
    }

    fn new_bar(&self, total: usize) -> Option<ProgressBar> {
        if !self.formatter.shows_progress() || total < 2 {
            return None;
        }

        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        let template = if self.formatter.colors_enabled() {
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}"
        } else {
            "{spinner} [{bar:40}] {pos}/{len} {msg}"
        };
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            bar.set_style(style.progress_chars("#>-"));
        }
        Some(bar)
    }

    /// Print a line without tearing the active bar
    fn print(&self, bar: Option<&ProgressBar>, line: &str, to_stderr: bool) {
        let emit = || {
            if to_stderr {
                eprintln!("{line}");
            } else {
                self.formatter.println(line);
            }
        };
        match bar {
            Some(bar) => bar.suspend(emit),
            None => emit(),
        }
    }

    /// Clear any bar left from the last batch
    pub fn finish(&self) {
        if let Ok(mut guard) = self.bar.lock()
            && let Some(bar) = guard.take()
        {
            bar.finish_and_clear();
        }
    }
}

impl TransferObserver for ProgressObserver {
    fn on_event(&self, event: TransferEvent<'_>) {
        let Ok(mut guard) = self.bar.lock() else {
            return;
        };

        match event {
            TransferEvent::BatchStarted { operation, total } => {
                if let Some(previous) = guard.take() {
                    previous.finish_and_clear();
                }
                *guard = self.new_bar(total);
                if let Some(bar) = guard.as_ref() {
                    let message = match operation {
                        Operation::Upload => "Uploading",
                        Operation::Download => "Downloading",
                        Operation::Copy => "Copying",
                        Operation::Delete => "Deleting",
                    };
                    bar.set_message(message);
                }
            }
            TransferEvent::Completed { item, bytes } => {
                if !self.formatter.is_quiet() {
                    let line = self.formatter.item_line(item, bytes);
                    self.print(guard.as_ref(), &line, false);
                }
                if let Some(bar) = guard.as_ref() {
                    bar.inc(1);
                }
            }
            TransferEvent::Failed(failure) => {
                if !self.formatter.is_json() {
                    let line = self.formatter.failure_line(failure);
                    self.print(guard.as_ref(), &line, true);
                }
                if let Some(bar) = guard.as_ref() {
                    bar.inc(1);
                }
            }
        }
    }
}

impl Drop for ProgressObserver {
    fn drop(&mut self) {
        self.finish();
    }
}
