//! SPSS system file reader.
//!
//! [`DatasetReader`] is the parsing capability the converter depends on:
//! bytes in, [`TabularDataset`] out. [`SavReader`] implements it for `.sav`
//! and `.zsav` files:
//!
//! 1. `header` reads the fixed file header and detects byte order
//! 2. `dictionary` reads variable, label, document and extension records
//! 3. `data` decodes uncompressed, bytecode or zlib case data
//! 4. this module settles column types and assembles the polars frame

mod cursor;
pub mod data;
pub mod dictionary;
pub mod header;

#[cfg(test)]
pub(crate) mod fixtures;

use crate::config::ReadOptions;
use crate::constants::sav::{MAGIC_SAV, MAGIC_ZSAV, MAX_EXACT_INTEGER};
use crate::dataset::TabularDataset;
use crate::error::{ConvertError, Result};
use crate::models::{FileMetadata, Variable};
use crate::schema::{self, ColumnType};
use data::{RawColumn, read_cases};
use dictionary::{Dictionary, decode_text, parse_dictionary};
use header::{FileHeader, parse_sav_header};
use polars::prelude::*;
use tracing::{debug, info};

/// Parses raw file bytes into a dataset
pub trait DatasetReader: Send + Sync {
    fn read(&self, bytes: &[u8]) -> Result<TabularDataset>;
}

/// Reader for SPSS system files
#[derive(Debug, Clone, Default)]
pub struct SavReader {
    options: ReadOptions,
}

impl SavReader {
    pub fn new(options: ReadOptions) -> Self {
        Self { options }
    }

    /// Whether `bytes` start with a system file signature
    pub fn sniff(bytes: &[u8]) -> bool {
        bytes.starts_with(MAGIC_SAV) || bytes.starts_with(MAGIC_ZSAV)
    }
}

impl DatasetReader for SavReader {
    fn read(&self, bytes: &[u8]) -> Result<TabularDataset> {
        let header = parse_sav_header(bytes)?;
        let dictionary = parse_dictionary(bytes, &header)?;
        let columns = read_cases(bytes, &header, &dictionary, &self.options)?;
        let dataset = build_dataset(header, dictionary, columns, &self.options)?;

        info!(
            "Read system file: {} rows x {} columns",
            dataset.row_count(),
            dataset.column_count()
        );
        Ok(dataset)
    }
}

fn build_dataset(
    header: FileHeader,
    dictionary: Dictionary,
    columns: Vec<RawColumn>,
    options: &ReadOptions,
) -> Result<TabularDataset> {
    let frame_columns = dictionary
        .variables
        .iter()
        .zip(columns)
        .map(|(variable, raw)| build_column(variable, raw, options))
        .collect::<Result<Vec<Column>>>()?;

    let frame = DataFrame::new(frame_columns)
        .map_err(|e| ConvertError::parse(format!("invalid dataset layout: {}", e)))?;

    let metadata = FileMetadata {
        product: decode_text(dictionary.encoding, &header.product),
        file_label: decode_text(dictionary.encoding, &header.file_label),
        created: header.created,
        encoding: dictionary.encoding.name().to_string(),
        compression: header.compression,
        byte_order: header.byte_order,
        declared_cases: header.case_count,
        weight_variable: dictionary.weight_variable,
        documents: dictionary.documents,
    };

    TabularDataset::new(frame, dictionary.variables, metadata)
}

fn build_column(variable: &Variable, raw: RawColumn, options: &ReadOptions) -> Result<Column> {
    let name = PlSmallStr::from(variable.name.as_str());
    let labelled = options.apply_value_labels && !variable.value_labels.is_empty();

    let series = match raw {
        RawColumn::Text(values) if labelled => {
            let values: Vec<Option<String>> = values
                .into_iter()
                .map(|v| {
                    v.map(|s| {
                        variable
                            .label_for_text(&s)
                            .map(str::to_string)
                            .unwrap_or(s)
                    })
                })
                .collect();
            Series::new(name, values)
        }
        RawColumn::Text(values) => Series::new(name, values),
        RawColumn::Numeric(values) if labelled => {
            let values: Vec<Option<String>> = values
                .iter()
                .map(|v| {
                    v.map(|n| {
                        variable
                            .label_for_number(n)
                            .map(str::to_string)
                            .unwrap_or_else(|| format_number(n))
                    })
                })
                .collect();
            Series::new(name, values)
        }
        RawColumn::Numeric(values) => {
            let column_type = schema::settle(schema::declared_type(variable), &values);
            debug!(
                "Column {} ({}) materialised as {:?}",
                variable.name, variable.format, column_type
            );
            numeric_series(name, column_type, values)
        }
    };

    Ok(series.into_column())
}

fn numeric_series(name: PlSmallStr, column_type: ColumnType, values: Vec<Option<f64>>) -> Series {
    match column_type {
        ColumnType::Integer => {
            Int64Chunked::from_iter_options(name, values.iter().map(|v| v.map(|n| n as i64)))
                .into_series()
        }
        ColumnType::Date => Int32Chunked::from_iter_options(
            name,
            values.iter().map(|v| v.map(schema::spss_to_unix_days)),
        )
        .into_date()
        .into_series(),
        ColumnType::Datetime => Int64Chunked::from_iter_options(
            name,
            values.iter().map(|v| v.map(schema::spss_to_unix_millis)),
        )
        .into_datetime(TimeUnit::Milliseconds, None)
        .into_series(),
        ColumnType::Time => Int64Chunked::from_iter_options(
            name,
            values.iter().map(|v| v.map(schema::spss_to_time_nanos)),
        )
        .into_time()
        .into_series(),
        ColumnType::Float | ColumnType::Text => Series::new(name, values),
    }
}

/// Render a coded value without a trailing `.0` for whole numbers
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() <= MAX_EXACT_INTEGER {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
