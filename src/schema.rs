//! Column type mapping for SPSS variables.
//!
//! SPSS stores every numeric variable as an f64; the print format decides how
//! the value is meant to be read. This module maps print formats onto the
//! column types of the in-memory table and converts SPSS time values.

use crate::constants::sav::{GREGORIAN_TO_UNIX_SECONDS, MAX_EXACT_INTEGER, SECONDS_PER_DAY};
use crate::models::Variable;
use polars::prelude::{DataType, TimeUnit};

/// Column type a variable is materialised as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Date,
    Datetime,
    Time,
    Text,
}

impl ColumnType {
    pub fn dtype(&self) -> DataType {
        match self {
            ColumnType::Integer => DataType::Int64,
            ColumnType::Float => DataType::Float64,
            ColumnType::Date => DataType::Date,
            ColumnType::Datetime => DataType::Datetime(TimeUnit::Milliseconds, None),
            ColumnType::Time => DataType::Time,
            ColumnType::Text => DataType::String,
        }
    }
}

/// Format names indexed by SPSS format type code
pub fn format_name(code: u8) -> &'static str {
    match code {
        1 => "A",
        2 => "AHEX",
        3 => "COMMA",
        4 => "DOLLAR",
        5 => "F",
        6 => "IB",
        7 => "PIBHEX",
        8 => "P",
        9 => "PIB",
        10 => "PK",
        11 => "RB",
        12 => "RBHEX",
        15 => "Z",
        16 => "N",
        17 => "E",
        20 => "DATE",
        21 => "TIME",
        22 => "DATETIME",
        23 => "ADATE",
        24 => "JDATE",
        25 => "DTIME",
        26 => "WKDAY",
        27 => "MONTH",
        28 => "MOYR",
        29 => "QYR",
        30 => "WKYR",
        31 => "PCT",
        32 => "DOT",
        33 => "CCA",
        34 => "CCB",
        35 => "CCC",
        36 => "CCD",
        37 => "CCE",
        38 => "EDATE",
        39 => "SDATE",
        40 => "MTIME",
        41 => "YMDHMS",
        _ => "?",
    }
}

/// Type implied by the variable's dictionary entry alone.
///
/// `Integer` and `Time` are provisional: [`settle`] demotes them to `Float`
/// when the data does not fit.
pub fn declared_type(variable: &Variable) -> ColumnType {
    if !variable.is_numeric() {
        return ColumnType::Text;
    }
    match variable.format.code {
        20 | 23 | 24 | 28 | 29 | 30 | 38 | 39 => ColumnType::Date,
        22 | 41 => ColumnType::Datetime,
        21 | 40 => ColumnType::Time,
        // WKDAY and MONTH hold small integer codes
        26 | 27 => ColumnType::Integer,
        _ if variable.format.decimals == 0 => ColumnType::Integer,
        _ => ColumnType::Float,
    }
}

/// Final column type once the non-missing values are known
pub fn settle(declared: ColumnType, values: &[Option<f64>]) -> ColumnType {
    match declared {
        ColumnType::Integer if !values.iter().flatten().all(|v| is_exact_integer(*v)) => {
            ColumnType::Float
        }
        ColumnType::Time
            if !values
                .iter()
                .flatten()
                .all(|v| (0.0..SECONDS_PER_DAY).contains(v)) =>
        {
            ColumnType::Float
        }
        other => other,
    }
}

fn is_exact_integer(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0 && value.abs() <= MAX_EXACT_INTEGER
}

/// Days since 1970-01-01 for an SPSS date value
pub fn spss_to_unix_days(value: f64) -> i32 {
    ((value - GREGORIAN_TO_UNIX_SECONDS) / SECONDS_PER_DAY).floor() as i32
}

/// Milliseconds since 1970-01-01 for an SPSS datetime value
pub fn spss_to_unix_millis(value: f64) -> i64 {
    ((value - GREGORIAN_TO_UNIX_SECONDS) * 1000.0).round() as i64
}

/// Nanoseconds since midnight for an SPSS time value
pub fn spss_to_time_nanos(value: f64) -> i64 {
    (value * 1_000_000_000.0).round() as i64
}
