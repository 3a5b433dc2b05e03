//! Structured logging configuration.

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Default filter directive.
pub const DEFAULT_LEVEL: &str = "info";

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name; anything but `json` is pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive, e.g. `info` or `crm_transfer=debug,warn`.
    pub level: String,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: DEFAULT_LEVEL.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Applies overrides from a key lookup.
    ///
    /// Keys: `CRM_TRANSFER_LOG` (filter directive), `CRM_TRANSFER_LOG_FORMAT`
    /// and `CRM_TRANSFER_LOG_FILE`.
    #[must_use]
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("CRM_TRANSFER_LOG").filter(|v| !v.trim().is_empty()) {
            self.level = level;
        }
        if let Some(format) = lookup("CRM_TRANSFER_LOG_FORMAT") {
            self.format = LogFormat::parse(&format);
        }
        if let Some(file) = lookup("CRM_TRANSFER_LOG_FILE").filter(|v| !v.trim().is_empty()) {
            self.file = Some(PathBuf::from(file));
        }
        self
    }

    /// Builds the event filter, falling back to [`DEFAULT_LEVEL`] for an
    /// unparsable directive.
    #[must_use]
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
    }
}
