//! Output writers for converted datasets
//!
//! Each writer serializes a [`TabularDataset`] into an already open file.
//! The converter owns the file: it creates a temporary file next to the
//! destination, hands it to the writer and persists it afterwards.

use crate::config::{ConverterConfig, CsvOptions, XlsxOptions};
use crate::constants::{
    DEFAULT_SHEET_NAME, EXCEL_ILLEGAL_SHEET_CHARS, EXCEL_MAX_COLUMNS, EXCEL_MAX_ROWS,
    EXCEL_MAX_SHEET_NAME_LEN, EXCEL_UNIX_EPOCH_DAYS,
};
use crate::dataset::TabularDataset;
use crate::error::{ConvertError, Result};
use crate::models::OutputFormat;

use polars::prelude::{CsvWriter, DataType, QuoteStyle, SerWriter, Series, TimeUnit};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

const MILLIS_PER_DAY: f64 = 86_400_000.0;
const MICROS_PER_DAY: f64 = 86_400_000_000.0;
const NANOS_PER_DAY: f64 = 86_400_000_000_000.0;

/// Serializes a dataset in one output format
pub trait OutputWriter: Send + Sync {
    fn format(&self) -> OutputFormat;

    fn write(&self, dataset: &TabularDataset, sink: &mut File) -> Result<()>;
}

/// Build the writer for `format`, reporting failures against `destination`
pub fn writer_for(
    format: OutputFormat,
    config: &ConverterConfig,
    output_name: &str,
    destination: &Path,
) -> Box<dyn OutputWriter> {
    match format {
        OutputFormat::Csv => Box::new(CsvOutputWriter::new(
            destination.to_path_buf(),
            config.csv.clone(),
        )),
        OutputFormat::Xlsx => {
            let requested = config.xlsx.sheet_name.as_deref().unwrap_or(output_name);
            Box::new(XlsxOutputWriter::new(
                destination.to_path_buf(),
                sanitize_sheet_name(requested),
                config.xlsx.clone(),
            ))
        }
    }
}

/// Turn an arbitrary name into one Excel accepts as a worksheet name
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !EXCEL_ILLEGAL_SHEET_CHARS.contains(c) && !c.is_control())
        .collect();
    let truncated: String = cleaned
        .trim()
        .trim_matches('\'')
        .chars()
        .take(EXCEL_MAX_SHEET_NAME_LEN)
        .collect();
    let truncated = truncated.trim_end_matches('\'').trim_end();

    // "History" is reserved by Excel
    if truncated.is_empty() || truncated.eq_ignore_ascii_case("history") {
        DEFAULT_SHEET_NAME.to_string()
    } else {
        truncated.to_string()
    }
}

/// CSV via the polars writer
#[derive(Debug, Clone)]
pub struct CsvOutputWriter {
    path: PathBuf,
    options: CsvOptions,
}

impl CsvOutputWriter {
    pub fn new(path: PathBuf, options: CsvOptions) -> Self {
        Self { path, options }
    }
}

impl OutputWriter for CsvOutputWriter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Csv
    }

    fn write(&self, dataset: &TabularDataset, sink: &mut File) -> Result<()> {
        let mut frame = dataset.frame().clone();

        CsvWriter::new(sink)
            .include_header(true)
            .with_separator(self.options.separator)
            .with_quote_style(QuoteStyle::Necessary)
            .with_date_format(Some(self.options.date_format.clone()))
            .with_datetime_format(Some(self.options.datetime_format.clone()))
            .with_time_format(Some(self.options.time_format.clone()))
            .finish(&mut frame)
            .map_err(|e| ConvertError::write(OutputFormat::Csv, &self.path, e))?;

        debug!(
            "Wrote {} rows as CSV to {}",
            frame.height(),
            self.path.display()
        );
        Ok(())
    }
}

/// Single-sheet workbook via `rust_xlsxwriter`
#[derive(Debug, Clone)]
pub struct XlsxOutputWriter {
    path: PathBuf,
    sheet_name: String,
    options: XlsxOptions,
}

struct CellFormats {
    header: Format,
    date: Format,
    datetime: Format,
    time: Format,
}

impl XlsxOutputWriter {
    pub fn new(path: PathBuf, sheet_name: String, options: XlsxOptions) -> Self {
        Self {
            path,
            sheet_name,
            options,
        }
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    fn fail(&self, reason: impl std::fmt::Display) -> ConvertError {
        ConvertError::write(OutputFormat::Xlsx, &self.path, reason)
    }

    fn check_limits(&self, dataset: &TabularDataset) -> Result<()> {
        // One row is taken by the header
        if dataset.row_count() + 1 > EXCEL_MAX_ROWS {
            return Err(self.fail(format!(
                "{} rows exceed the Excel limit of {} rows per sheet",
                dataset.row_count(),
                EXCEL_MAX_ROWS - 1
            )));
        }
        if dataset.column_count() > EXCEL_MAX_COLUMNS {
            return Err(self.fail(format!(
                "{} columns exceed the Excel limit of {} columns per sheet",
                dataset.column_count(),
                EXCEL_MAX_COLUMNS
            )));
        }
        Ok(())
    }

    fn write_column(
        &self,
        worksheet: &mut Worksheet,
        col: u16,
        series: &Series,
        formats: &CellFormats,
    ) -> Result<()> {
        let xlsx = |e: XlsxError| self.fail(e);
        let polars = |e: polars::prelude::PolarsError| self.fail(e);

        match series.dtype() {
            DataType::String => {
                for (i, value) in series.str().map_err(polars)?.into_iter().enumerate() {
                    if let Some(text) = value {
                        worksheet.write_string(data_row(i), col, text).map_err(xlsx)?;
                    }
                }
            }
            DataType::Boolean => {
                for (i, value) in series.bool().map_err(polars)?.into_iter().enumerate() {
                    if let Some(flag) = value {
                        worksheet.write_boolean(data_row(i), col, flag).map_err(xlsx)?;
                    }
                }
            }
            DataType::Date => {
                let days = series.cast(&DataType::Int32).map_err(polars)?;
                for (i, value) in days.i32().map_err(polars)?.into_iter().enumerate() {
                    if let Some(days) = value {
                        let serial = f64::from(days) + EXCEL_UNIX_EPOCH_DAYS;
                        worksheet
                            .write_number_with_format(data_row(i), col, serial, &formats.date)
                            .map_err(xlsx)?;
                    }
                }
            }
            DataType::Datetime(unit, _) => {
                let per_day = match unit {
                    TimeUnit::Milliseconds => MILLIS_PER_DAY,
                    TimeUnit::Microseconds => MICROS_PER_DAY,
                    TimeUnit::Nanoseconds => NANOS_PER_DAY,
                };
                let ticks = series.cast(&DataType::Int64).map_err(polars)?;
                for (i, value) in ticks.i64().map_err(polars)?.into_iter().enumerate() {
                    if let Some(ticks) = value {
                        let serial = ticks as f64 / per_day + EXCEL_UNIX_EPOCH_DAYS;
                        worksheet
                            .write_number_with_format(data_row(i), col, serial, &formats.datetime)
                            .map_err(xlsx)?;
                    }
                }
            }
            DataType::Time => {
                let nanos = series.cast(&DataType::Int64).map_err(polars)?;
                for (i, value) in nanos.i64().map_err(polars)?.into_iter().enumerate() {
                    if let Some(nanos) = value {
                        let fraction = nanos as f64 / NANOS_PER_DAY;
                        worksheet
                            .write_number_with_format(data_row(i), col, fraction, &formats.time)
                            .map_err(xlsx)?;
                    }
                }
            }
            dtype if dtype.is_integer() || dtype.is_float() => {
                let numbers = series.cast(&DataType::Float64).map_err(polars)?;
                for (i, value) in numbers.f64().map_err(polars)?.into_iter().enumerate() {
                    // Excel has no cell value for NaN or infinities
                    if let Some(number) = value.filter(|n| n.is_finite()) {
                        worksheet.write_number(data_row(i), col, number).map_err(xlsx)?;
                    }
                }
            }
            _ => {
                let text = series.cast(&DataType::String).map_err(polars)?;
                for (i, value) in text.str().map_err(polars)?.into_iter().enumerate() {
                    if let Some(text) = value {
                        worksheet.write_string(data_row(i), col, text).map_err(xlsx)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl OutputWriter for XlsxOutputWriter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Xlsx
    }

    fn write(&self, dataset: &TabularDataset, sink: &mut File) -> Result<()> {
        self.check_limits(dataset)?;

        let formats = CellFormats {
            header: Format::new().set_bold(),
            date: Format::new().set_num_format(&self.options.date_format),
            datetime: Format::new().set_num_format(&self.options.datetime_format),
            time: Format::new().set_num_format(&self.options.time_format),
        };

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(&self.sheet_name)
            .map_err(|e| self.fail(e))?;

        // Limits are checked above, so column indices fit in u16
        for (index, column) in dataset.frame().get_columns().iter().enumerate() {
            let col = index as u16;
            worksheet
                .write_string_with_format(0, col, column.name().as_str(), &formats.header)
                .map_err(|e| self.fail(e))?;
            self.write_column(worksheet, col, column.as_materialized_series(), &formats)?;
        }

        workbook.save_to_writer(sink).map_err(|e| self.fail(e))?;

        debug!(
            "Wrote {} rows to sheet '{}' in {}",
            dataset.row_count(),
            self.sheet_name,
            self.path.display()
        );
        Ok(())
    }
}

fn data_row(index: usize) -> u32 {
    (index + 1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReadOptions;
    use crate::sav::fixtures::SavBuilder;
    use crate::sav::{DatasetReader, SavReader};
    use std::io::{Read, Seek, SeekFrom};
    use tempfile::TempDir;

    fn dataset(builder: SavBuilder) -> TabularDataset {
        SavReader::new(ReadOptions::default())
            .read(&builder.build())
            .unwrap()
    }

    fn written(writer: &dyn OutputWriter, dataset: &TabularDataset) -> Vec<u8> {
        let mut file = tempfile::tempfile().unwrap();
        writer.write(dataset, &mut file).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_sanitize_sheet_name() {
        assert_eq!(sanitize_sheet_name("converted_file"), "converted_file");
        assert_eq!(sanitize_sheet_name("wave[1]: a/b?"), "wave1 ab");
        assert_eq!(sanitize_sheet_name(""), "Sheet1");
        assert_eq!(sanitize_sheet_name("***"), "Sheet1");
        assert_eq!(sanitize_sheet_name("'quoted'"), "quoted");
        assert_eq!(sanitize_sheet_name("History"), "Sheet1");

        let long = "a".repeat(40);
        assert_eq!(sanitize_sheet_name(&long).chars().count(), 31);
    }

    #[test]
    fn test_writer_for_selects_format() {
        let config = ConverterConfig::default();
        let path = Path::new("out.csv");
        assert_eq!(
            writer_for(OutputFormat::Csv, &config, "out", path).format(),
            OutputFormat::Csv
        );
        assert_eq!(
            writer_for(OutputFormat::Xlsx, &config, "out", path).format(),
            OutputFormat::Xlsx
        );
    }

    #[test]
    fn test_csv_quotes_only_when_needed() {
        let dataset = dataset(
            SavBuilder::new()
                .numeric("id", 0)
                .string("note", 16)
                .row(vec![1.0.into(), "plain".into()])
                .row(vec![2.0.into(), "a,b".into()])
                .row(vec![3.0.into(), "say \"hi\"".into()]),
        );
        let writer = CsvOutputWriter::new(PathBuf::from("out.csv"), CsvOptions::default());

        let text = String::from_utf8(written(&writer, &dataset)).unwrap();
        assert_eq!(
            text,
            "id,note\n1,plain\n2,\"a,b\"\n3,\"say \"\"hi\"\"\"\n"
        );
    }

    #[test]
    fn test_csv_missing_values_are_empty_fields() {
        let dataset = dataset(
            SavBuilder::new()
                .numeric("id", 0)
                .numeric("score", 2)
                .row(vec![1.0.into(), crate::sav::fixtures::FixtureValue::Missing])
                .row(vec![2.0.into(), 7.25.into()]),
        );
        let writer = CsvOutputWriter::new(PathBuf::from("out.csv"), CsvOptions::default());

        let text = String::from_utf8(written(&writer, &dataset)).unwrap();
        assert_eq!(text, "id,score\n1,\n2,7.25\n");
    }

    #[test]
    fn test_xlsx_writes_readable_workbook() {
        use calamine::{Data, Reader, Xlsx, open_workbook};

        let dataset = dataset(
            SavBuilder::new()
                .numeric("id", 0)
                .string("name", 8)
                .row(vec![1.0.into(), "Ada".into()])
                .row(vec![2.0.into(), "Alan".into()]),
        );
        let writer = XlsxOutputWriter::new(
            PathBuf::from("out.xlsx"),
            "people".to_string(),
            XlsxOptions::default(),
        );
        assert_eq!(writer.sheet_name(), "people");

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.xlsx");
        let mut file = File::create(&path).unwrap();
        writer.write(&dataset, &mut file).unwrap();
        drop(file);

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["people".to_string()]);
        let range = workbook.worksheet_range("people").unwrap();
        assert_eq!(range.get_size(), (3, 2));
        assert_eq!(range.get_value((0, 0)), Some(&Data::String("id".to_string())));
        assert_eq!(range.get_value((1, 0)), Some(&Data::Float(1.0)));
        assert_eq!(range.get_value((2, 1)), Some(&Data::String("Alan".to_string())));
    }
}
