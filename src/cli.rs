//! Command-line interface.

use crate::config::ConverterConfig;
use crate::constants::{DEFAULT_OUTPUT_DIR, DEFAULT_OUTPUT_NAME, DEFAULT_PREVIEW_ROWS};
use crate::models::{ConversionRequest, OutputFormat};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "sav-converter")]
#[command(about = "Convert SPSS .sav files to CSV or XLSX")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// SPSS system file to convert (.sav or .zsav)
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// Directory the converted file is written to
    #[arg(long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Output file name without extension
    #[arg(long, value_name = "NAME", default_value = DEFAULT_OUTPUT_NAME)]
    pub output_name: String,

    /// Replace the output file if it already exists
    #[arg(long)]
    pub overwrite: bool,

    /// Number of rows shown in the preview
    #[arg(long, value_name = "N", default_value_t = DEFAULT_PREVIEW_ROWS)]
    pub preview_rows: usize,

    /// Do not print a preview of the data
    #[arg(long)]
    pub no_preview: bool,

    /// Write value labels instead of the coded values
    #[arg(long)]
    pub apply_value_labels: bool,

    /// Keep user-defined missing values instead of writing empty cells
    #[arg(long)]
    pub user_missing: bool,

    /// Hide the progress spinner
    #[arg(long)]
    pub no_progress: bool,

    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Args {
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    /// Build the converter configuration from the flags
    pub fn to_config(&self) -> ConverterConfig {
        let mut config = ConverterConfig::default()
            .with_preview_rows(self.preview_rows)
            .with_progress(!self.no_progress && !self.quiet)
            .with_user_missing(self.user_missing)
            .with_value_labels(self.apply_value_labels);
        if self.no_preview || self.quiet {
            config = config.without_preview();
        }
        config
    }

    /// Build the request once the input bytes are loaded
    pub fn to_request(&self, source: Vec<u8>) -> ConversionRequest {
        ConversionRequest::new(source, self.format)
            .with_output_dir(&self.output_dir)
            .with_output_name(&self.output_name)
            .with_overwrite(self.overwrite)
    }
}
