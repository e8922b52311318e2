//! Application constants for the SPSS converter
//!
//! Default request values, Excel sheet limits and the fixed values of the
//! SPSS system file format.

// =============================================================================
// Request Defaults
// =============================================================================

/// Output directory used when none is given
pub const DEFAULT_OUTPUT_DIR: &str = ".";

/// Output file name (without extension) used when none is given
pub const DEFAULT_OUTPUT_NAME: &str = "converted_file";

/// Number of rows shown in the data preview
pub const DEFAULT_PREVIEW_ROWS: usize = 5;

// =============================================================================
// CSV Output
// =============================================================================

pub const CSV_SEPARATOR: u8 = b',';
pub const CSV_DATE_FORMAT: &str = "%Y-%m-%d";
pub const CSV_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const CSV_TIME_FORMAT: &str = "%H:%M:%S";

// =============================================================================
// Excel Output
// =============================================================================

/// Maximum rows in a worksheet, header row included
pub const EXCEL_MAX_ROWS: usize = 1_048_576;

/// Maximum columns in a worksheet
pub const EXCEL_MAX_COLUMNS: usize = 16_384;

/// Maximum length of a worksheet name
pub const EXCEL_MAX_SHEET_NAME_LEN: usize = 31;

/// Characters Excel rejects in worksheet names
pub const EXCEL_ILLEGAL_SHEET_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

pub const XLSX_DATE_FORMAT: &str = "yyyy-mm-dd";
pub const XLSX_DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";
pub const XLSX_TIME_FORMAT: &str = "hh:mm:ss";

/// Days between the Excel epoch (1899-12-30) and 1970-01-01
pub const EXCEL_UNIX_EPOCH_DAYS: f64 = 25_569.0;

// =============================================================================
// SPSS System File Format
// =============================================================================

pub mod sav {
    /// Magic of an uncompressed or bytecode-compressed system file
    pub const MAGIC_SAV: &[u8; 4] = b"$FL2";

    /// Magic of a zlib-compressed system file
    pub const MAGIC_ZSAV: &[u8; 4] = b"$FL3";

    /// Size of the fixed file header record in bytes
    pub const HEADER_LEN: usize = 176;

    /// Width of one case element in bytes
    pub const ELEMENT_WIDTH: usize = 8;

    /// Record type tags of the dictionary
    pub mod record {
        pub const VARIABLE: i32 = 2;
        pub const VALUE_LABELS: i32 = 3;
        pub const VALUE_LABEL_VARIABLES: i32 = 4;
        pub const DOCUMENT: i32 = 6;
        pub const EXTENSION: i32 = 7;
        pub const DICTIONARY_END: i32 = 999;
    }

    /// Extension record subtypes the reader interprets
    pub mod extension {
        pub const INTEGER_INFO: i32 = 3;
        pub const FLOAT_INFO: i32 = 4;
        pub const LONG_NAMES: i32 = 13;
        pub const VERY_LONG_STRINGS: i32 = 14;
        pub const ENCODING: i32 = 20;
        pub const LONG_STRING_LABELS: i32 = 21;
        pub const LONG_STRING_MISSING: i32 = 22;
    }

    /// Bytecode compression opcodes
    pub mod opcode {
        pub const PADDING: u8 = 0;
        pub const END_OF_FILE: u8 = 252;
        pub const RAW: u8 = 253;
        pub const SPACES: u8 = 254;
        pub const SYSMIS: u8 = 255;
    }

    /// Length of one line of a document record
    pub const DOCUMENT_LINE_LEN: usize = 80;

    /// Bytes of data carried by each segment of a very long string
    pub const VERY_LONG_SEGMENT_DATA: usize = 252;

    /// Allocated width of every non-final very long string segment
    pub const VERY_LONG_SEGMENT_WIDTH: usize = 255;

    /// Seconds between the Gregorian epoch used by SPSS (1582-10-14) and 1970-01-01
    pub const GREGORIAN_TO_UNIX_SECONDS: f64 = 12_219_379_200.0;

    pub const SECONDS_PER_DAY: f64 = 86_400.0;

    /// Default system-missing value (-DBL_MAX)
    pub const DEFAULT_SYSMIS: f64 = -f64::MAX;

    /// Largest integer exactly representable in an f64
    pub const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;
}
