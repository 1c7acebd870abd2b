//! Output formatter for human-readable and JSON output
//!
//! Ensures consistent output formatting across all commands.

use console::Style;
use obs_core::transfer::{ItemFailure, Operation, TransferItem};
use serde::Serialize;

use super::OutputConfig;

/// Color theme for styled output
#[derive(Debug, Clone)]
pub struct Theme {
    /// Local paths - default
    pub path: Style,
    /// Remote locations - cyan
    pub remote: Style,
    /// Sizes - green
    pub size: Style,
    /// Operation labels - bold
    pub label: Style,
    /// Success messages - green
    pub success: Style,
    /// Error messages - red
    pub error: Style,
    /// Warning messages - yellow
    pub warning: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            path: Style::new(),
            remote: Style::new().cyan(),
            size: Style::new().green(),
            label: Style::new().bold(),
            success: Style::new().green(),
            error: Style::new().red(),
            warning: Style::new().yellow(),
        }
    }
}

impl Theme {
    /// Returns a theme with no styling (for no-color mode)
    pub fn plain() -> Self {
        Self {
            path: Style::new(),
            remote: Style::new(),
            size: Style::new(),
            label: Style::new(),
            success: Style::new(),
            error: Style::new(),
            warning: Style::new(),
        }
    }
}

/// Formatter for CLI output
///
/// Handles both human-readable and JSON output formats based on configuration.
/// When JSON mode is enabled, stdout carries only the final JSON document.
#[derive(Debug, Clone)]
pub struct Formatter {
    config: OutputConfig,
    theme: Theme,
}

impl Formatter {
    /// Create a new formatter with the given configuration
    pub fn new(config: OutputConfig) -> Self {
        let theme = if config.no_color || config.json {
            Theme::plain()
        } else {
            Theme::default()
        };
        Self { config, theme }
    }

    /// Check if JSON output mode is enabled
    pub fn is_json(&self) -> bool {
        self.config.json
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.config.quiet
    }

    /// Check if colors are enabled
    pub fn colors_enabled(&self) -> bool {
        !self.config.no_color && !self.config.json
    }

    /// Whether per-item lines and progress bars should be shown
    pub fn shows_progress(&self) -> bool {
        !self.config.quiet && !self.config.json
    }

    // ========== Style helper methods ==========

    /// Style a location; remote locations are highlighted
    pub fn style_location(&self, location: &obs_core::Location) -> String {
        let style = if location.is_remote() {
            &self.theme.remote
        } else {
            &self.theme.path
        };
        style.apply_to(location).to_string()
    }

    /// Format a byte count (e.g. `1.2 KiB`) and style it
    pub fn style_size(&self, bytes: u64) -> String {
        self.theme
            .size
            .apply_to(humansize::format_size(bytes, humansize::BINARY))
            .to_string()
    }

    /// Style an operation label
    pub fn style_label(&self, text: &str) -> String {
        self.theme.label.apply_to(text).to_string()
    }

    /// Confirmation line for a completed item
    ///
    /// `upload: ./report.txt -> obs://backups/report.txt (1.2 KiB)`
    pub fn item_line(&self, item: &TransferItem, bytes: u64) -> String {
        let label = self.style_label(&format!("{}:", item.operation));
        match item.operation {
            Operation::Delete => {
                format!("{label} {}", self.style_location(&item.destination))
            }
            _ => format!(
                "{label} {} -> {} ({})",
                self.style_location(&item.source),
                self.style_location(&item.destination),
                self.style_size(bytes)
            ),
        }
    }

    /// Line reporting one failed item
    pub fn failure_line(&self, failure: &ItemFailure) -> String {
        let text = format!("{} failed: {}: {}", failure.operation, failure.path, failure.error);
        self.theme.error.apply_to(text).to_string()
    }

    // ========== Output methods ==========

    /// Output a value
    ///
    /// In JSON mode, serializes the value to JSON.
    /// In human mode, uses the Display implementation.
    pub fn output<T: Serialize + std::fmt::Display>(&self, value: &T) {
        if self.config.json {
            // JSON output: strict, no colors, no extra formatting
            self.json(value);
            return;
        }

        if !self.config.quiet {
            println!("{value}");
        }
    }

    /// Output a success message
    pub fn success(&self, message: &str) {
        if !self.shows_progress() {
            return;
        }

        let checkmark = self.theme.success.apply_to("✓");
        println!("{checkmark} {message}");
    }

    /// Output a fatal error message
    ///
    /// Errors are always printed, even in quiet mode.
    pub fn error(&self, message: &str) {
        if self.config.json {
            let error = serde_json::json!({ "error": message });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&error).unwrap_or_else(|_| message.to_string())
            );
        } else {
            let prefix = self.theme.error.apply_to("Error:");
            eprintln!("{prefix} {message}");
        }
    }

    /// Output a warning message
    pub fn warning(&self, message: &str) {
        if !self.shows_progress() {
            return;
        }

        let warn_icon = self.theme.warning.apply_to("⚠");
        eprintln!("{warn_icon} {message}");
    }

    /// Output JSON directly
    pub fn json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error serializing output: {e}"),
        }
    }

    /// Print a line of text (respects quiet and JSON mode)
    pub fn println(&self, message: &str) {
        if !self.shows_progress() {
            return;
        }
        println!("{message}");
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}
