//! Pipeline tests for the converter
//!
//! Exercise complete conversions against fixture system files written into
//! temporary directories.


use crate::config::ConverterConfig;
use crate::models::{ConversionRequest, OutputFormat};
use crate::processor::Converter;
use crate::sav::fixtures::SavBuilder;
use std::path::Path;

/// Two-column dataset used across the pipeline tests
pub fn id_score_file() -> Vec<u8> {
    SavBuilder::new()
        .numeric("id", 0)
        .numeric("score", 2)
        .row(vec![1.0.into(), 9.5.into()])
        .row(vec![2.0.into(), 7.25.into()])
        .build()
}

pub fn request(source: Vec<u8>, format: OutputFormat, dir: &Path) -> ConversionRequest {
    ConversionRequest::new(source, format)
        .with_output_dir(dir)
        .with_output_name("converted_file")
}

pub fn quiet_converter() -> Converter {
    Converter::new(ConverterConfig::default().with_progress(false))
}
