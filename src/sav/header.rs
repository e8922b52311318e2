//! System file header parsing.
//!
//! Reads the fixed 176-byte header record that opens every SPSS system file:
//! signature, byte order, compression scheme, case layout and the creation
//! stamp written by the producing program.

use super::cursor::Cursor;
use crate::constants::sav::{HEADER_LEN, MAGIC_SAV, MAGIC_ZSAV};
use crate::error::{ConvertError, Result};
use crate::models::{ByteOrder, Compression};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

/// Contents of the file header record
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub product: Vec<u8>,
    pub byte_order: ByteOrder,
    /// 8-byte elements per case, when recorded
    pub nominal_case_size: Option<usize>,
    pub compression: Compression,
    /// 1-based element index of the weight variable
    pub weight_index: Option<usize>,
    pub case_count: Option<usize>,
    pub bias: f64,
    pub created: Option<NaiveDateTime>,
    pub file_label: Vec<u8>,
}

/// Parse the header record at the start of `bytes`
pub fn parse_sav_header(bytes: &[u8]) -> Result<FileHeader> {
    if bytes.len() < 4 {
        return Err(ConvertError::parse(format!(
            "file is too short to be an SPSS system file ({} bytes)",
            bytes.len()
        )));
    }

    let magic = &bytes[..4];
    let zlib_magic = if magic == MAGIC_SAV {
        false
    } else if magic == MAGIC_ZSAV {
        true
    } else {
        return Err(ConvertError::parse(format!(
            "not an SPSS system file: unrecognised signature {:?}",
            String::from_utf8_lossy(magic)
        )));
    };

    if bytes.len() < HEADER_LEN {
        return Err(ConvertError::parse(format!(
            "truncated file header ({} of {} bytes)",
            bytes.len(),
            HEADER_LEN
        )));
    }

    let byte_order = detect_byte_order(&bytes[64..68])?;
    let mut cursor = Cursor::new(bytes, byte_order);
    cursor.skip(4, "signature")?;
    let product = cursor.take(60, "product name")?.to_vec();
    cursor.skip(4, "layout code")?;
    let nominal_case_size = optional_count(cursor.read_i32("nominal case size")?);

    let compression = match cursor.read_i32("compression code")? {
        0 => Compression::None,
        1 => Compression::Bytecode,
        2 if zlib_magic => Compression::Zlib,
        2 => {
            return Err(ConvertError::parse(
                "zlib compression declared in a file without the $FL3 signature",
            ));
        }
        other => {
            return Err(ConvertError::parse(format!(
                "unknown compression code {}",
                other
            )));
        }
    };
    if zlib_magic && compression != Compression::Zlib {
        return Err(ConvertError::parse(
            "$FL3 signature requires zlib compression",
        ));
    }

    let weight_index = optional_count(cursor.read_i32("weight index")?).filter(|&i| i > 0);
    let case_count = optional_count(cursor.read_i32("case count")?);
    let bias = cursor.read_f64("compression bias")?;
    let date = cursor.take(9, "creation date")?;
    let time = cursor.take(8, "creation time")?;
    let file_label = cursor.take(64, "file label")?.to_vec();
    cursor.skip(3, "header padding")?;

    let header = FileHeader {
        product,
        byte_order,
        nominal_case_size,
        compression,
        weight_index,
        case_count,
        bias,
        created: parse_creation_stamp(date, time),
        file_label,
    };

    debug!(
        "Parsed header: order={:?}, compression={:?}, case_size={:?}, cases={:?}",
        header.byte_order, header.compression, header.nominal_case_size, header.case_count
    );

    Ok(header)
}

/// Layout code is 2 or 3 in the writer's native byte order
fn detect_byte_order(layout: &[u8]) -> Result<ByteOrder> {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(layout);
    if matches!(i32::from_le_bytes(buf), 2 | 3) {
        Ok(ByteOrder::Little)
    } else if matches!(i32::from_be_bytes(buf), 2 | 3) {
        Ok(ByteOrder::Big)
    } else {
        Err(ConvertError::parse(format!(
            "unrecognised layout code {:?}",
            buf
        )))
    }
}

fn optional_count(value: i32) -> Option<usize> {
    usize::try_from(value).ok()
}

/// Creation stamp is `dd mmm yy` + `hh:mm:ss`; unreadable stamps are dropped
fn parse_creation_stamp(date: &[u8], time: &[u8]) -> Option<NaiveDateTime> {
    let date = String::from_utf8_lossy(date);
    let time = String::from_utf8_lossy(time);
    let date = NaiveDate::parse_from_str(date.trim(), "%d %b %y").ok()?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M:%S").ok()?;
    Some(date.and_time(time))
}
