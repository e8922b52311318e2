//! Core data structures and types for SPSS conversion.
//!
//! Defines the conversion request and its outcome, the output formats, and
//! the variable and file metadata carried alongside a parsed dataset.

use crate::constants::{DEFAULT_OUTPUT_DIR, DEFAULT_OUTPUT_NAME};
use crate::error::{ConvertError, Result};
use crate::schema;
use chrono::NaiveDateTime;
use clap::ValueEnum;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Output formats the converter can serialize to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Xlsx,
}

impl OutputFormat {
    /// File extension (without the dot) for this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Csv => f.write_str("CSV"),
            OutputFormat::Xlsx => f.write_str("XLSX"),
        }
    }
}

/// A single conversion: source bytes plus where and how to write them
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub source: Vec<u8>,
    pub format: OutputFormat,
    pub output_dir: PathBuf,
    /// Output file name without extension
    pub output_name: String,
    pub overwrite: bool,
}

impl ConversionRequest {
    /// Create a request with the default destination and no overwrite
    pub fn new(source: Vec<u8>, format: OutputFormat) -> Self {
        Self {
            source,
            format,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
            overwrite: false,
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_output_name(mut self, output_name: impl Into<String>) -> Self {
        self.output_name = output_name.into();
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Full output path: `<output_dir>/<output_name>.<extension>`
    pub fn destination(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", self.output_name, self.format.extension()))
    }

    /// Reject output names that would escape the output directory
    pub fn validate(&self) -> Result<()> {
        let name = self.output_name.trim();
        if name.is_empty() {
            return Err(ConvertError::configuration("output name must not be empty"));
        }
        if name == "." || name == ".." {
            return Err(ConvertError::configuration(format!(
                "output name '{}' is not a file name",
                self.output_name
            )));
        }
        if self
            .output_name
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0')
        {
            return Err(ConvertError::configuration(format!(
                "output name '{}' must not contain path separators",
                self.output_name
            )));
        }
        Ok(())
    }
}

/// Success descriptor of a finished conversion
#[derive(Debug, Clone)]
pub struct ConversionSummary {
    pub destination: PathBuf,
    pub format: OutputFormat,
    pub rows: usize,
    pub columns: usize,
    pub bytes_written: u64,
    /// First rows of the dataset, when a preview was requested
    pub preview: Option<DataFrame>,
    pub elapsed: Duration,
}

/// SPSS print/write format: type code, field width and decimal places
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintFormat {
    pub code: u8,
    pub width: u8,
    pub decimals: u8,
}

impl PrintFormat {
    /// Unpack the `type << 16 | width << 8 | decimals` layout of a variable record
    pub fn from_packed(raw: i32) -> Self {
        let raw = raw as u32;
        Self {
            code: ((raw >> 16) & 0xff) as u8,
            width: ((raw >> 8) & 0xff) as u8,
            decimals: (raw & 0xff) as u8,
        }
    }
}

impl fmt::Display for PrintFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", schema::format_name(self.code), self.width)?;
        if self.decimals > 0 {
            write!(f, ".{}", self.decimals)?;
        }
        Ok(())
    }
}

/// User-defined missing values of a variable
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum MissingValues {
    #[default]
    None,
    Numeric {
        discrete: Vec<f64>,
        range: Option<(f64, f64)>,
    },
    Text(Vec<String>),
}

impl MissingValues {
    pub fn matches_number(&self, value: f64) -> bool {
        match self {
            MissingValues::Numeric { discrete, range } => {
                discrete.contains(&value)
                    || range.is_some_and(|(low, high)| value >= low && value <= high)
            }
            _ => false,
        }
    }

    pub fn matches_text(&self, value: &str) -> bool {
        match self {
            MissingValues::Text(values) => values.iter().any(|v| v == value),
            _ => false,
        }
    }
}

/// Value a label is attached to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LabelValue {
    Number(f64),
    Text(String),
}

/// Dictionary entry for one column of the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    /// Eight-character name from the variable record
    pub short_name: String,
    pub label: Option<String>,
    /// String width in bytes; 0 for numeric variables
    pub width: usize,
    pub format: PrintFormat,
    pub missing: MissingValues,
    pub value_labels: Vec<(LabelValue, String)>,
}

impl Variable {
    pub fn is_numeric(&self) -> bool {
        self.width == 0
    }

    /// Label attached to a numeric value, if any
    pub fn label_for_number(&self, value: f64) -> Option<&str> {
        self.value_labels.iter().find_map(|(key, label)| match key {
            LabelValue::Number(n) if *n == value => Some(label.as_str()),
            _ => None,
        })
    }

    /// Label attached to a string value, if any
    pub fn label_for_text(&self, value: &str) -> Option<&str> {
        self.value_labels.iter().find_map(|(key, label)| match key {
            LabelValue::Text(s) if s == value => Some(label.as_str()),
            _ => None,
        })
    }
}

/// Case data compression used by a system file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    None,
    Bytecode,
    Zlib,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    Little,
    Big,
}

/// File-level metadata from the header and extension records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub product: String,
    pub file_label: String,
    pub created: Option<NaiveDateTime>,
    pub encoding: String,
    pub compression: Compression,
    pub byte_order: ByteOrder,
    /// Case count from the header; `None` when the writer did not record it
    pub declared_cases: Option<usize>,
    pub weight_variable: Option<String>,
    pub documents: Vec<String>,
}
