//! SAV Converter Library
//!
//! Converts SPSS system files (`.sav`, and zlib-compressed `.zsav`) into CSV
//! or XLSX.
//!
//! This library provides tools for:
//! - Reading SPSS system files: header, dictionary and case data in all
//!   three compression modes, decoded with the file's character encoding
//! - Mapping SPSS print formats onto typed columns (integers, floats, dates,
//!   datetimes, times, strings)
//! - Writing CSV with polars and XLSX with `rust_xlsxwriter`
//! - Staging output next to the destination so existing files are never
//!   overwritten unless requested
//!
//! ```no_run
//! use sav_converter::{ConversionRequest, Converter, ConverterConfig, OutputFormat};
//!
//! let source = std::fs::read("survey.sav").unwrap();
//! let request = ConversionRequest::new(source, OutputFormat::Csv).with_output_name("survey");
//! let summary = Converter::new(ConverterConfig::default())
//!     .convert_blocking(request)
//!     .unwrap();
//! println!("{} rows written to {}", summary.rows, summary.destination.display());
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod models;
pub mod processor;
pub mod sav;
pub mod schema;

pub use config::{ConverterConfig, CsvOptions, ReadOptions, XlsxOptions};
pub use dataset::TabularDataset;
pub use error::{ConvertError, ErrorKind, Result};
pub use models::{ConversionRequest, ConversionSummary, OutputFormat};
pub use processor::Converter;
pub use processor::writer::{CsvOutputWriter, OutputWriter, XlsxOutputWriter};
pub use sav::{DatasetReader, SavReader};
