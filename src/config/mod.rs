//! Configuration management.
//!
//! Engine tuning is read from a TOML file whose sections mirror
//! [`TransferConfig`]:
//!
//! ```toml
//! [import]
//! preview_rows = 10
//! max_rows = 50000
//! delimiter = ";"
//!
//! [bulk]
//! failure_policy = "continue_on_error"
//!
//! [export]
//! header_format = "readable"
//!
//! [audit]
//! db_path = "/var/lib/crm/audit.db"
//!
//! [logging]
//! format = "json"
//! level = "info"
//! ```
//!
//! Every key is optional. `CRM_TRANSFER_*` environment variables override
//! the file.

use crate::io::mapping::DEFAULT_PREVIEW_ROWS;
use crate::io::{ColumnMapper, CsvOptions, ExportOptions, HeaderFormat};
use crate::models::EntityKind;
use crate::observability::{LogFormat, LoggingConfig};
use crate::services::{BulkService, FailurePolicy};
use crate::storage::memory::InMemoryAuditLogStore;
use crate::storage::{AuditLogStore, RecordStore, SqliteAuditLogStore};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default cap on data rows per upload.
pub const DEFAULT_MAX_ROWS: usize = 10_000;

const APP_DIR: &str = "crm-transfer";

/// Import tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSettings {
    /// Data rows shown in a preview.
    pub preview_rows: usize,
    /// Maximum data rows per upload.
    pub max_rows: usize,
    /// Field delimiter.
    pub delimiter: u8,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            preview_rows: DEFAULT_PREVIEW_ROWS,
            max_rows: DEFAULT_MAX_ROWS,
            delimiter: b',',
        }
    }
}

/// Main configuration for the engine.
#[derive(Debug, Clone, Default)]
pub struct TransferConfig {
    /// Import tuning.
    pub import: ImportSettings,
    /// What bulk actions do when a record fails.
    pub failure_policy: FailurePolicy,
    /// Default header format for exports.
    pub header_format: HeaderFormat,
    /// `SQLite` file for import logs (`None` keeps logs in memory).
    pub audit_db_path: Option<PathBuf>,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Import section.
    pub import: Option<ConfigFileImport>,
    /// Bulk section.
    pub bulk: Option<ConfigFileBulk>,
    /// Export section.
    pub export: Option<ConfigFileExport>,
    /// Audit section.
    pub audit: Option<ConfigFileAudit>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Import section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileImport {
    /// Preview rows.
    pub preview_rows: Option<usize>,
    /// Row limit.
    pub max_rows: Option<usize>,
    /// Single-character delimiter.
    pub delimiter: Option<String>,
}

/// Bulk section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileBulk {
    /// Failure policy name.
    pub failure_policy: Option<String>,
}

/// Export section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileExport {
    /// Header format name.
    pub header_format: Option<String>,
}

/// Audit section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileAudit {
    /// Database path.
    pub db_path: Option<String>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive, e.g. `info` or `crm_transfer=debug`.
    pub level: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

impl TransferConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a value is
    /// out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::operation("read_config_file", e))?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or a value is out of
    /// range.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| Error::operation("parse_config_file", e))?;
        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Reads `config.toml` from the platform config dir
    /// (`~/.config/crm-transfer/` on Linux), then applies environment
    /// overrides. When the file does not name an audit database, logs go to
    /// `audit.db` in the platform data dir.
    ///
    /// Returns default configuration if no config file is found or it
    /// cannot be parsed.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default().apply_env_overrides();
        };

        let path = base_dirs.config_dir().join(APP_DIR).join("config.toml");
        let mut config = if path.exists() {
            Self::load_from_file(&path).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                Self::default()
            })
        } else {
            Self::default()
        };

        if config.audit_db_path.is_none() {
            config.audit_db_path = Some(base_dirs.data_dir().join(APP_DIR).join("audit.db"));
        }
        config.apply_env_overrides()
    }

    /// Applies `CRM_TRANSFER_*` overrides from the process environment.
    #[must_use]
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from a key lookup.
    ///
    /// Recognized keys: `CRM_TRANSFER_MAX_ROWS`, `CRM_TRANSFER_DELIMITER`,
    /// `CRM_TRANSFER_FAILURE_POLICY`, `CRM_TRANSFER_AUDIT_DB` plus the
    /// logging keys of [`LoggingConfig::apply_overrides`]. Unparsable
    /// values are ignored with a warning.
    #[must_use]
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("CRM_TRANSFER_MAX_ROWS") {
            match raw.trim().parse() {
                Ok(max_rows) => self.import.max_rows = max_rows,
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid CRM_TRANSFER_MAX_ROWS"),
            }
        }
        if let Some(raw) = lookup("CRM_TRANSFER_DELIMITER") {
            match parse_delimiter(&raw) {
                Ok(delimiter) => self.import.delimiter = delimiter,
                Err(e) => tracing::warn!(error = %e, "Ignoring invalid CRM_TRANSFER_DELIMITER"),
            }
        }
        if let Some(raw) = lookup("CRM_TRANSFER_FAILURE_POLICY") {
            match raw.parse() {
                Ok(policy) => self.failure_policy = policy,
                Err(e) => tracing::warn!(error = %e, "Ignoring invalid CRM_TRANSFER_FAILURE_POLICY"),
            }
        }
        if let Some(path) = lookup("CRM_TRANSFER_AUDIT_DB").filter(|p| !p.trim().is_empty()) {
            self.audit_db_path = Some(PathBuf::from(path));
        }
        self.logging = self.logging.apply_overrides(&lookup);
        self
    }

    /// Converts a `ConfigFile` to `TransferConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(import) = file.import {
            if let Some(preview_rows) = import.preview_rows {
                config.import.preview_rows = preview_rows;
            }
            if let Some(max_rows) = import.max_rows {
                if max_rows == 0 {
                    return Err(Error::InvalidInput("import.max_rows must be positive".to_string()));
                }
                config.import.max_rows = max_rows;
            }
            if let Some(delimiter) = import.delimiter {
                config.import.delimiter = parse_delimiter(&delimiter)?;
            }
        }
        if let Some(policy) = file.bulk.and_then(|b| b.failure_policy) {
            config.failure_policy = policy.parse()?;
        }
        if let Some(format) = file.export.and_then(|e| e.header_format) {
            config.header_format = format.parse()?;
        }
        if let Some(path) = file.audit.and_then(|a| a.db_path) {
            config.audit_db_path = Some(PathBuf::from(path));
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format);
            }
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
            config.logging.file = logging.file.map(PathBuf::from);
        }

        Ok(config)
    }

    /// Sets the audit database path.
    #[must_use]
    pub fn with_audit_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_db_path = Some(path.into());
        self
    }

    /// CSV parsing options for uploads.
    #[must_use]
    pub fn csv_options(&self) -> CsvOptions {
        CsvOptions::default()
            .with_delimiter(self.import.delimiter)
            .with_max_rows(self.import.max_rows)
    }

    /// Column mapper with the configured preview size.
    #[must_use]
    pub fn column_mapper(&self) -> ColumnMapper {
        ColumnMapper::new().with_preview_rows(self.import.preview_rows)
    }

    /// Export options for `kind` with the configured header format.
    #[must_use]
    pub fn export_options(&self, kind: EntityKind) -> ExportOptions {
        ExportOptions::new(kind).with_header_format(self.header_format)
    }

    /// Bulk service over `records` with the configured failure policy.
    #[must_use]
    pub fn bulk_service(&self, records: Arc<dyn RecordStore>) -> BulkService {
        BulkService::new(records).with_failure_policy(self.failure_policy)
    }

    /// Opens the configured import log store.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` database cannot be opened.
    pub fn open_audit_store(&self) -> Result<Arc<dyn AuditLogStore>> {
        match &self.audit_db_path {
            Some(path) => Ok(Arc::new(SqliteAuditLogStore::new(path)?)),
            None => Ok(Arc::new(InMemoryAuditLogStore::new())),
        }
    }
}

fn parse_delimiter(raw: &str) -> Result<u8> {
    let raw = if raw == "\\t" { "\t" } else { raw };
    match raw.as_bytes() {
        [byte] if *byte != b'"' && *byte != b'\n' => Ok(*byte),
        _ => Err(Error::InvalidInput(format!(
            "delimiter must be a single ASCII character, got '{raw}'"
        ))),
    }
}
