//! Case data decoding.
//!
//! Cases are sequences of 8-byte elements. Depending on the header they are
//! stored raw, bytecode-compressed, or as zlib blocks wrapping a bytecode
//! stream. Decoding yields one raw column per dictionary variable.

use super::cursor::{Cursor, f64_from_bytes};
use super::dictionary::{Dictionary, decode_text};
use super::header::FileHeader;
use crate::config::ReadOptions;
use crate::constants::sav::{ELEMENT_WIDTH, opcode};
use crate::error::{ConvertError, Result};
use crate::models::{ByteOrder, Compression};
use flate2::read::ZlibDecoder;
use std::io::Read;
use tracing::debug;

/// Decoded values of one variable, before type settlement
#[derive(Debug, Clone, PartialEq)]
pub enum RawColumn {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl RawColumn {
    pub fn len(&self) -> usize {
        match self {
            RawColumn::Numeric(values) => values.len(),
            RawColumn::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
enum Element {
    Raw([u8; 8]),
    Number(f64),
    Sysmis,
    Spaces,
}

trait ElementSource {
    fn next_element(&mut self) -> Result<Option<Element>>;
}

struct Uncompressed<'a> {
    cursor: Cursor<'a>,
}

impl ElementSource for Uncompressed<'_> {
    fn next_element(&mut self) -> Result<Option<Element>> {
        if self.cursor.remaining() == 0 {
            return Ok(None);
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.cursor.take(ELEMENT_WIDTH, "case data")?);
        Ok(Some(Element::Raw(raw)))
    }
}

struct Bytecode<'a> {
    data: &'a [u8],
    pos: usize,
    codes: [u8; 8],
    next_code: usize,
    bias: f64,
    finished: bool,
}

impl<'a> Bytecode<'a> {
    fn new(data: &'a [u8], bias: f64) -> Self {
        Self {
            data,
            pos: 0,
            codes: [0; 8],
            next_code: 8,
            bias,
            finished: false,
        }
    }
}

impl ElementSource for Bytecode<'_> {
    fn next_element(&mut self) -> Result<Option<Element>> {
        loop {
            if self.finished {
                return Ok(None);
            }
            if self.next_code == self.codes.len() {
                let left = &self.data[self.pos..];
                if left.is_empty() {
                    return Ok(None);
                }
                if left.len() < ELEMENT_WIDTH {
                    // Some writers pad the stream with zero bytes
                    if left.iter().all(|b| *b == 0) {
                        return Ok(None);
                    }
                    return Err(ConvertError::parse(format!(
                        "truncated compression block at offset {}",
                        self.pos
                    )));
                }
                self.codes.copy_from_slice(&left[..ELEMENT_WIDTH]);
                self.pos += ELEMENT_WIDTH;
                self.next_code = 0;
            }

            let code = self.codes[self.next_code];
            self.next_code += 1;
            match code {
                opcode::PADDING => continue,
                opcode::END_OF_FILE => {
                    self.finished = true;
                    return Ok(None);
                }
                opcode::RAW => {
                    let left = &self.data[self.pos..];
                    if left.len() < ELEMENT_WIDTH {
                        return Err(ConvertError::parse(format!(
                            "compressed data ends inside an uncompressed value at offset {}",
                            self.pos
                        )));
                    }
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(&left[..ELEMENT_WIDTH]);
                    self.pos += ELEMENT_WIDTH;
                    return Ok(Some(Element::Raw(raw)));
                }
                opcode::SPACES => return Ok(Some(Element::Spaces)),
                opcode::SYSMIS => return Ok(Some(Element::Sysmis)),
                compressed => return Ok(Some(Element::Number(compressed as f64 - self.bias))),
            }
        }
    }
}

/// Decode every case following the dictionary into per-variable columns
pub fn read_cases(
    bytes: &[u8],
    header: &FileHeader,
    dictionary: &Dictionary,
    options: &ReadOptions,
) -> Result<Vec<RawColumn>> {
    match header.compression {
        Compression::None => {
            let cursor = Cursor::at(bytes, dictionary.data_offset, header.byte_order)?;
            decode(Uncompressed { cursor }, header, dictionary, options)
        }
        Compression::Bytecode => {
            let data = bytes.get(dictionary.data_offset..).unwrap_or_default();
            decode(Bytecode::new(data, header.bias), header, dictionary, options)
        }
        Compression::Zlib => {
            let data = inflate_blocks(bytes, dictionary.data_offset, header.byte_order)?;
            decode(Bytecode::new(&data, header.bias), header, dictionary, options)
        }
    }
}

fn decode(
    mut source: impl ElementSource,
    header: &FileHeader,
    dictionary: &Dictionary,
    options: &ReadOptions,
) -> Result<Vec<RawColumn>> {
    let capacity = header.case_count.unwrap_or(0).min(1 << 20);
    let mut columns: Vec<RawColumn> = dictionary
        .variables
        .iter()
        .map(|v| {
            if v.is_numeric() {
                RawColumn::Numeric(Vec::with_capacity(capacity))
            } else {
                RawColumn::Text(Vec::with_capacity(capacity))
            }
        })
        .collect();

    let mut case = Vec::with_capacity(dictionary.element_count);
    let mut text = Vec::new();
    let mut cases = 0usize;

    while header.case_count.is_none_or(|expected| cases < expected) {
        case.clear();
        while case.len() < dictionary.element_count {
            match source.next_element()? {
                Some(element) => case.push(element),
                None if case.is_empty() => break,
                None => {
                    return Err(ConvertError::parse(format!(
                        "truncated case {}: data ends after {} of {} elements",
                        cases + 1,
                        case.len(),
                        dictionary.element_count
                    )));
                }
            }
        }
        if case.is_empty() {
            break;
        }

        for (index, column) in columns.iter_mut().enumerate() {
            let variable = &dictionary.variables[index];
            let slots = &dictionary.layouts[index];
            match column {
                RawColumn::Numeric(values) => {
                    let value = match case[slots[0].element] {
                        Element::Raw(raw) => {
                            Some(f64_from_bytes(raw, header.byte_order))
                                .filter(|v| *v != dictionary.sysmis)
                        }
                        Element::Number(n) => Some(n),
                        Element::Sysmis | Element::Spaces => None,
                    };
                    let value = value
                        .filter(|v| options.user_missing || !variable.missing.matches_number(*v));
                    values.push(value);
                }
                RawColumn::Text(values) => {
                    text.clear();
                    for slot in slots {
                        let start = text.len();
                        for element in &case[slot.element..slot.element + slot.elements] {
                            match element {
                                Element::Raw(raw) => text.extend_from_slice(raw),
                                Element::Spaces => text.extend_from_slice(b"        "),
                                Element::Number(_) | Element::Sysmis => {
                                    return Err(ConvertError::parse(format!(
                                        "numeric code found in string variable {} of case {}",
                                        variable.name,
                                        cases + 1
                                    )));
                                }
                            }
                        }
                        text.truncate(start + slot.used);
                    }
                    let value = decode_text(dictionary.encoding, &text);
                    let value = Some(value)
                        .filter(|v| options.user_missing || !variable.missing.matches_text(v));
                    values.push(value);
                }
            }
        }
        cases += 1;
    }

    if let Some(expected) = header.case_count {
        if cases < expected {
            return Err(ConvertError::parse(format!(
                "file declares {} cases but only {} were found",
                expected, cases
            )));
        }
    }

    debug!("Decoded {} cases", cases);
    Ok(columns)
}

/// Inflate the zlib blocks of a `.zsav` file into one bytecode stream
fn inflate_blocks(bytes: &[u8], offset: usize, order: ByteOrder) -> Result<Vec<u8>> {
    let mut cursor = Cursor::at(bytes, offset, order)?;
    cursor.skip(8, "zlib header offset")?;
    let trailer_offset = to_offset(cursor.read_i64("zlib trailer offset")?, "zlib trailer")?;
    cursor.skip(8, "zlib trailer length")?;

    let mut trailer = Cursor::at(bytes, trailer_offset, order)?;
    trailer.skip(16, "zlib trailer bias")?;
    trailer.skip(4, "zlib block size")?;
    let block_count = trailer.read_count("zlib block count")?;

    let mut stream = Vec::new();
    for block in 0..block_count {
        trailer.skip(8, "zlib uncompressed offset")?;
        let start = to_offset(trailer.read_i64("zlib compressed offset")?, "zlib block")?;
        let expected = trailer.read_count("zlib uncompressed size")?;
        let len = trailer.read_count("zlib compressed size")?;
        let compressed = start
            .checked_add(len)
            .and_then(|end| bytes.get(start..end))
            .ok_or_else(|| {
                ConvertError::parse(format!(
                    "zlib block {} lies outside the file (offset {}, {} bytes)",
                    block, start, len
                ))
            })?;

        let before = stream.len();
        ZlibDecoder::new(compressed)
            .read_to_end(&mut stream)
            .map_err(|e| ConvertError::parse(format!("zlib block {} is corrupt: {}", block, e)))?;
        if stream.len() - before != expected {
            return Err(ConvertError::parse(format!(
                "zlib block {} inflated to {} bytes, expected {}",
                block,
                stream.len() - before,
                expected
            )));
        }
    }

    debug!("Inflated {} zlib blocks into {} bytes", block_count, stream.len());
    Ok(stream)
}

fn to_offset(value: i64, what: &str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| ConvertError::parse(format!("invalid {} offset {}", what, value)))
}
