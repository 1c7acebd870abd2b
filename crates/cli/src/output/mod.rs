//! Terminal output
//!
//! Human-readable or JSON output, plus progress reporting for transfers.

mod formatter;
mod progress;

pub use formatter::Formatter;
pub use progress::ProgressObserver;

/// Output settings from the global flags
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Strict JSON on stdout, no colors or progress bars
    pub json: bool,
    pub no_color: bool,
    /// Suppress everything except errors
    pub quiet: bool,
}
