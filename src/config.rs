//! Configuration management and validation.
//!
//! Provides the configuration structures for a conversion: how the system
//! file is read, how each output format is written, and what the command
//! line shows while the pipeline runs. Configuration is built per request
//! and passed explicitly; nothing is read from disk.

use crate::constants::{
    CSV_DATE_FORMAT, CSV_DATETIME_FORMAT, CSV_SEPARATOR, CSV_TIME_FORMAT, DEFAULT_PREVIEW_ROWS,
    XLSX_DATE_FORMAT, XLSX_DATETIME_FORMAT, XLSX_TIME_FORMAT,
};
use crate::error::{ConvertError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How values are interpreted while reading a system file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Keep user-defined missing values instead of turning them into nulls
    pub user_missing: bool,

    /// Replace coded values with their value labels
    pub apply_value_labels: bool,
}

/// CSV serialization settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvOptions {
    pub separator: u8,
    pub date_format: String,
    pub datetime_format: String,
    pub time_format: String,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            separator: CSV_SEPARATOR,
            date_format: CSV_DATE_FORMAT.to_string(),
            datetime_format: CSV_DATETIME_FORMAT.to_string(),
            time_format: CSV_TIME_FORMAT.to_string(),
        }
    }
}

/// Spreadsheet serialization settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XlsxOptions {
    /// Worksheet name; derived from the output name when unset
    pub sheet_name: Option<String>,
    /// Excel number formats for temporal cells
    pub date_format: String,
    pub datetime_format: String,
    pub time_format: String,
}

impl Default for XlsxOptions {
    fn default() -> Self {
        Self {
            sheet_name: None,
            date_format: XLSX_DATE_FORMAT.to_string(),
            datetime_format: XLSX_DATETIME_FORMAT.to_string(),
            time_format: XLSX_TIME_FORMAT.to_string(),
        }
    }
}

/// Configuration for one conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Include a preview of the first rows in the summary
    pub show_preview: bool,

    /// Number of rows in the preview
    pub preview_rows: usize,

    /// Drive a progress spinner while converting
    pub show_progress: bool,

    pub read: ReadOptions,
    pub csv: CsvOptions,
    pub xlsx: XlsxOptions,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            show_preview: true,
            preview_rows: DEFAULT_PREVIEW_ROWS,
            show_progress: false,
            read: ReadOptions::default(),
            csv: CsvOptions::default(),
            xlsx: XlsxOptions::default(),
        }
    }
}

impl ConverterConfig {
    pub fn with_preview_rows(mut self, rows: usize) -> Self {
        self.preview_rows = rows;
        self
    }

    pub fn without_preview(mut self) -> Self {
        self.show_preview = false;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn with_user_missing(mut self, user_missing: bool) -> Self {
        self.read.user_missing = user_missing;
        self
    }

    pub fn with_value_labels(mut self, apply_value_labels: bool) -> Self {
        self.read.apply_value_labels = apply_value_labels;
        self
    }

    pub fn with_sheet_name(mut self, sheet_name: impl Into<String>) -> Self {
        self.xlsx.sheet_name = Some(sheet_name.into());
        self
    }

    /// Check option combinations that cannot produce a sensible conversion
    pub fn validate(&self) -> Result<()> {
        if self.show_preview && self.preview_rows == 0 {
            return Err(ConvertError::configuration(
                "preview rows must be at least 1 when the preview is enabled",
            ));
        }
        if self.csv.separator == b'"' || self.csv.separator == b'\n' {
            return Err(ConvertError::configuration(format!(
                "'{}' cannot be used as the CSV separator",
                self.csv.separator.escape_ascii()
            )));
        }
        if let Some(name) = &self.xlsx.sheet_name {
            if name.trim().is_empty() {
                return Err(ConvertError::configuration("sheet name must not be empty"));
            }
        }

        debug!("Configuration validated: {:?}", self);
        Ok(())
    }
}
