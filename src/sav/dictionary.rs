//! Dictionary record parsing.
//!
//! The dictionary follows the header and describes every variable: its
//! record layout inside a case, labels, missing values and the extension
//! records that carry long names, very long strings and the text encoding.

use super::cursor::{Cursor, f64_from_bytes};
use super::header::FileHeader;
use crate::constants::sav::{
    DEFAULT_SYSMIS, DOCUMENT_LINE_LEN, ELEMENT_WIDTH, HEADER_LEN, VERY_LONG_SEGMENT_DATA,
    VERY_LONG_SEGMENT_WIDTH, extension, record,
};
use crate::error::{ConvertError, Result};
use crate::models::{ByteOrder, LabelValue, MissingValues, PrintFormat, Variable};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Placement of one variable's bytes inside a case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Index of the first 8-byte element
    pub element: usize,
    pub elements: usize,
    /// Bytes of the slot that carry data
    pub used: usize,
}

/// Parsed dictionary: variables in file order plus decoding parameters
#[derive(Debug, Clone)]
pub struct Dictionary {
    pub variables: Vec<Variable>,
    /// One entry per variable; very long strings span several slots
    pub layouts: Vec<Vec<Slot>>,
    pub element_count: usize,
    pub encoding: &'static Encoding,
    pub sysmis: f64,
    pub documents: Vec<String>,
    pub weight_variable: Option<String>,
    /// Offset of the first byte after the dictionary termination record
    pub data_offset: usize,
}

/// A type-2 record before long-string segments are merged
struct RawVariable {
    element: usize,
    width: usize,
    short_name: Vec<u8>,
    label: Option<Vec<u8>>,
    format: PrintFormat,
    missing: RawMissing,
}

enum RawMissing {
    None,
    Numeric {
        discrete: Vec<f64>,
        range: Option<(f64, f64)>,
    },
    Text(Vec<[u8; 8]>),
}

struct RawValueLabels {
    labels: Vec<([u8; 8], Vec<u8>)>,
    elements: Vec<usize>,
}

#[derive(Default)]
struct Extensions {
    character_code: Option<i32>,
    sysmis: Option<f64>,
    long_names: Option<Vec<u8>>,
    very_long_strings: Option<Vec<u8>>,
    encoding: Option<String>,
    long_string_labels: Option<Vec<u8>>,
    long_string_missing: Option<Vec<u8>>,
}

/// Parse all dictionary records following the header
pub fn parse_dictionary(bytes: &[u8], header: &FileHeader) -> Result<Dictionary> {
    let mut cursor = Cursor::at(bytes, HEADER_LEN, header.byte_order)?;

    let mut raw_variables = Vec::new();
    let mut value_labels = Vec::new();
    let mut documents = Vec::new();
    let mut extensions = Extensions::default();
    let mut element = 0usize;
    // Continuation records still owed by the last string variable
    let mut pending = 0usize;

    loop {
        let record_type = cursor.read_i32("record type")?;
        if record_type != record::VARIABLE && pending > 0 {
            return Err(missing_continuations(&raw_variables, pending));
        }
        match record_type {
            record::VARIABLE => {
                match read_variable(&mut cursor, element)? {
                    Some(raw) => {
                        if pending > 0 {
                            return Err(missing_continuations(&raw_variables, pending));
                        }
                        pending = element_count(raw.width) - 1;
                        raw_variables.push(raw);
                    }
                    None if pending == 0 => {
                        return Err(ConvertError::parse(format!(
                            "continuation record without a string variable at element {}",
                            element + 1
                        )));
                    }
                    None => pending -= 1,
                }
                element += 1;
            }
            record::VALUE_LABELS => value_labels.push(read_value_labels(&mut cursor)?),
            record::VALUE_LABEL_VARIABLES => {
                return Err(ConvertError::parse(format!(
                    "value label variable record without preceding labels at offset {}",
                    cursor.position() - 4
                )));
            }
            record::DOCUMENT => documents.extend(read_documents(&mut cursor)?),
            record::EXTENSION => read_extension(&mut cursor, &mut extensions)?,
            record::DICTIONARY_END => {
                cursor.skip(4, "dictionary termination filler")?;
                break;
            }
            other => {
                return Err(ConvertError::parse(format!(
                    "unrecognised record type {} at offset {}",
                    other,
                    cursor.position() - 4
                )));
            }
        }
    }

    let element_count = element;
    if raw_variables.is_empty() {
        return Err(ConvertError::parse("dictionary defines no variables"));
    }
    if let Some(declared) = header.nominal_case_size {
        if declared != element_count {
            warn!(
                "Header declares {} elements per case but the dictionary defines {}",
                declared, element_count
            );
        }
    }

    let encoding = resolve_encoding(&extensions);
    debug!("Dictionary uses encoding {}", encoding.name());

    let weight_element = header.weight_index.map(|i| i - 1);
    let (mut variables, layouts, weight_variable) =
        merge_segments(raw_variables, &extensions, encoding, weight_element, element_count)?;

    apply_value_labels(&mut variables, &layouts, value_labels, encoding, header);
    if let Some(data) = &extensions.long_string_labels {
        apply_long_string_labels(&mut variables, data, encoding, header.byte_order)?;
    }
    if let Some(data) = &extensions.long_string_missing {
        apply_long_string_missing(&mut variables, data, encoding, header.byte_order)?;
    }

    let documents = documents
        .iter()
        .map(|line| decode_text(encoding, line))
        .collect();

    Ok(Dictionary {
        variables,
        layouts,
        element_count,
        encoding,
        sysmis: extensions.sysmis.unwrap_or(DEFAULT_SYSMIS),
        documents,
        weight_variable,
        data_offset: cursor.position(),
    })
}

fn missing_continuations(raw_variables: &[RawVariable], pending: usize) -> ConvertError {
    let name = raw_variables
        .last()
        .map(|raw| String::from_utf8_lossy(&raw.short_name).into_owned())
        .unwrap_or_default();
    ConvertError::parse(format!(
        "string variable {} is missing {} continuation record(s)",
        name, pending
    ))
}

/// Read one type-2 record; continuation records return `None`
fn read_variable(cursor: &mut Cursor<'_>, element: usize) -> Result<Option<RawVariable>> {
    let var_type = cursor.read_i32("variable type")?;
    let has_label = cursor.read_i32("variable label flag")?;
    let missing_count = cursor.read_i32("missing value count")?;
    let print = cursor.read_i32("print format")?;
    cursor.skip(4, "write format")?;
    let short_name = trim_padding(cursor.take(8, "variable name")?).to_vec();

    if var_type == -1 {
        return Ok(None);
    }
    let width = usize::try_from(var_type)
        .ok()
        .filter(|w| *w <= VERY_LONG_SEGMENT_WIDTH)
        .ok_or_else(|| {
            ConvertError::parse(format!(
                "invalid variable type {} for variable {}",
                var_type,
                String::from_utf8_lossy(&short_name)
            ))
        })?;

    let label = match has_label {
        0 => None,
        1 => {
            let len = cursor.read_count("variable label length")?;
            let padded = len.div_ceil(4) * 4;
            let bytes = cursor.take(padded, "variable label")?;
            Some(bytes[..len].to_vec())
        }
        other => {
            return Err(ConvertError::parse(format!(
                "invalid variable label flag {}",
                other
            )));
        }
    };

    let missing = match (width, missing_count) {
        (_, 0) => RawMissing::None,
        (0, n @ 1..=3) => RawMissing::Numeric {
            discrete: read_f64s(cursor, n as usize)?,
            range: None,
        },
        (0, -2) => {
            let low = cursor.read_f64("missing range low")?;
            let high = cursor.read_f64("missing range high")?;
            RawMissing::Numeric {
                discrete: Vec::new(),
                range: Some((low, high)),
            }
        }
        (0, -3) => {
            let low = cursor.read_f64("missing range low")?;
            let high = cursor.read_f64("missing range high")?;
            RawMissing::Numeric {
                discrete: read_f64s(cursor, 1)?,
                range: Some((low, high)),
            }
        }
        (w, n @ 1..=3) if w > 0 => {
            let mut values = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(cursor.take(ELEMENT_WIDTH, "missing string value")?);
                values.push(raw);
            }
            RawMissing::Text(values)
        }
        (_, other) => {
            return Err(ConvertError::parse(format!(
                "invalid missing value count {} for variable {}",
                other,
                String::from_utf8_lossy(&short_name)
            )));
        }
    };

    Ok(Some(RawVariable {
        element,
        width,
        short_name,
        label,
        format: PrintFormat::from_packed(print),
        missing,
    }))
}

fn read_f64s(cursor: &mut Cursor<'_>, count: usize) -> Result<Vec<f64>> {
    (0..count).map(|_| cursor.read_f64("missing value")).collect()
}

fn read_value_labels(cursor: &mut Cursor<'_>) -> Result<RawValueLabels> {
    let count = cursor.read_count("value label count")?;
    let mut labels = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let mut value = [0u8; 8];
        value.copy_from_slice(cursor.take(ELEMENT_WIDTH, "value label value")?);
        let len = cursor.read_u8("value label length")? as usize;
        let padded = (len + 1).div_ceil(8) * 8 - 1;
        let text = cursor.take(padded, "value label")?;
        labels.push((value, text[..len].to_vec()));
    }

    let record_type = cursor.read_i32("record type")?;
    if record_type != record::VALUE_LABEL_VARIABLES {
        return Err(ConvertError::parse(format!(
            "value labels must be followed by a variable index record, found type {}",
            record_type
        )));
    }
    let var_count = cursor.read_count("value label variable count")?;
    let mut elements = Vec::with_capacity(var_count.min(1024));
    for _ in 0..var_count {
        let index = cursor.read_count("value label variable index")?;
        if index == 0 {
            return Err(ConvertError::parse("value label variable index 0"));
        }
        elements.push(index - 1);
    }

    Ok(RawValueLabels { labels, elements })
}

fn read_documents(cursor: &mut Cursor<'_>) -> Result<Vec<Vec<u8>>> {
    let lines = cursor.read_count("document line count")?;
    let mut documents = Vec::with_capacity(lines.min(1024));
    for _ in 0..lines {
        documents.push(cursor.take(DOCUMENT_LINE_LEN, "document line")?.to_vec());
    }
    Ok(documents)
}

fn read_extension(cursor: &mut Cursor<'_>, extensions: &mut Extensions) -> Result<()> {
    let subtype = cursor.read_i32("extension subtype")?;
    let size = cursor.read_count("extension element size")?;
    let count = cursor.read_count("extension element count")?;
    let len = size.checked_mul(count).ok_or_else(|| {
        ConvertError::parse(format!("extension record {} is too large", subtype))
    })?;
    let data = cursor.take(len, "extension record")?;
    let mut inner = Cursor::new(data, cursor.order());

    match subtype {
        extension::INTEGER_INFO if size == 4 && count >= 8 => {
            inner.skip(28, "machine integer info")?;
            extensions.character_code = Some(inner.read_i32("character code")?);
        }
        extension::FLOAT_INFO if size == 8 && count >= 1 => {
            extensions.sysmis = Some(inner.read_f64("system missing value")?);
        }
        extension::LONG_NAMES => extensions.long_names = Some(data.to_vec()),
        extension::VERY_LONG_STRINGS => extensions.very_long_strings = Some(data.to_vec()),
        extension::ENCODING => {
            extensions.encoding = Some(String::from_utf8_lossy(data).trim().to_string());
        }
        extension::LONG_STRING_LABELS => extensions.long_string_labels = Some(data.to_vec()),
        extension::LONG_STRING_MISSING => extensions.long_string_missing = Some(data.to_vec()),
        _ => debug!("Skipping extension record subtype {} ({} bytes)", subtype, len),
    }
    Ok(())
}

/// Encoding record wins over the character code of the integer info record
fn resolve_encoding(extensions: &Extensions) -> &'static Encoding {
    if let Some(label) = &extensions.encoding {
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            return encoding;
        }
        warn!("Unknown character encoding '{}', falling back", label);
    }
    match extensions.character_code {
        Some(65001) => UTF_8,
        Some(2) | Some(3) | Some(1252) | None => WINDOWS_1252,
        Some(code) => Encoding::for_label(format!("windows-{}", code).as_bytes())
            .or_else(|| Encoding::for_label(format!("cp{}", code).as_bytes()))
            .unwrap_or(WINDOWS_1252),
    }
}

/// Decode text in the file encoding and drop trailing padding
pub fn decode_text(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, _) = encoding.decode_without_bom_handling(trim_padding(bytes));
    text.into_owned()
}

fn trim_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| *b != b' ' && *b != 0)
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

/// `KEY=value` pairs separated by `separator`
fn parse_pairs(encoding: &'static Encoding, data: &[u8], separator: u8) -> HashMap<String, String> {
    data.split(|b| *b == separator)
        .filter_map(|entry| {
            let text = decode_text(encoding, entry);
            let (key, value) = text.split_once('=')?;
            Some((key.trim().to_uppercase(), value.to_string()))
        })
        .collect()
}

type Merged = (Vec<Variable>, Vec<Vec<Slot>>, Option<String>);

/// Fold very long string segments into single variables and resolve names
fn merge_segments(
    raw_variables: Vec<RawVariable>,
    extensions: &Extensions,
    encoding: &'static Encoding,
    weight_element: Option<usize>,
    element_count: usize,
) -> Result<Merged> {
    let long_names = extensions
        .long_names
        .as_deref()
        .map(|data| parse_pairs(encoding, data, b'\t'))
        .unwrap_or_default();
    let very_long: HashMap<String, usize> = extensions
        .very_long_strings
        .as_deref()
        .map(|data| parse_pairs(encoding, data, b'\t'))
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| {
            let width = value.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            width.parse().ok().map(|w| (key, w))
        })
        .collect();

    let mut variables = Vec::with_capacity(raw_variables.len());
    let mut layouts = Vec::with_capacity(raw_variables.len());
    let mut weight_variable = None;
    let mut raw_iter = raw_variables.into_iter();

    while let Some(raw) = raw_iter.next() {
        let short_name = decode_text(encoding, &raw.short_name);
        let key = short_name.to_uppercase();
        let mut slots = vec![Slot {
            element: raw.element,
            elements: self::element_count(raw.width),
            used: if raw.width == 0 {
                ELEMENT_WIDTH
            } else {
                raw.width
            },
        }];
        let mut width = raw.width;

        if let Some(&total) = very_long.get(&key).filter(|w| **w > VERY_LONG_SEGMENT_WIDTH) {
            let segments = total.div_ceil(VERY_LONG_SEGMENT_DATA);
            slots[0].used = VERY_LONG_SEGMENT_DATA;
            for index in 1..segments {
                let segment = raw_iter.next().ok_or_else(|| {
                    ConvertError::parse(format!(
                        "very long string {} is missing segment {} of {}",
                        short_name,
                        index + 1,
                        segments
                    ))
                })?;
                let last = index == segments - 1;
                slots.push(Slot {
                    element: segment.element,
                    elements: self::element_count(segment.width),
                    used: if last {
                        total - VERY_LONG_SEGMENT_DATA * index
                    } else {
                        VERY_LONG_SEGMENT_DATA
                    },
                });
            }
            width = total;
        }

        if let Some(slot) = slots
            .iter()
            .find(|slot| slot.element + slot.elements > element_count)
        {
            return Err(ConvertError::parse(format!(
                "variable {} needs elements {}..{} but a case has only {}",
                short_name,
                slot.element + 1,
                slot.element + slot.elements,
                element_count
            )));
        }

        let missing = match raw.missing {
            RawMissing::None => MissingValues::None,
            RawMissing::Numeric { discrete, range } => MissingValues::Numeric { discrete, range },
            RawMissing::Text(values) => MissingValues::Text(
                values.iter().map(|v| decode_text(encoding, v)).collect(),
            ),
        };

        let name = long_names
            .get(&key)
            .cloned()
            .unwrap_or_else(|| short_name.clone());

        if weight_element == Some(raw.element) {
            weight_variable = Some(name.clone());
        }

        variables.push(Variable {
            name,
            short_name,
            label: raw.label.map(|bytes| decode_text(encoding, &bytes)),
            width,
            format: raw.format,
            missing,
            value_labels: Vec::new(),
        });
        layouts.push(slots);
    }

    Ok((variables, layouts, weight_variable))
}

fn element_count(width: usize) -> usize {
    if width == 0 {
        1
    } else {
        width.div_ceil(ELEMENT_WIDTH)
    }
}

fn apply_value_labels(
    variables: &mut [Variable],
    layouts: &[Vec<Slot>],
    value_labels: Vec<RawValueLabels>,
    encoding: &'static Encoding,
    header: &FileHeader,
) {
    let by_element: HashMap<usize, usize> = layouts
        .iter()
        .enumerate()
        .map(|(index, slots)| (slots[0].element, index))
        .collect();

    for set in value_labels {
        for element in &set.elements {
            let Some(&index) = by_element.get(element) else {
                warn!("Value labels reference unknown element {}", element + 1);
                continue;
            };
            let variable = &mut variables[index];
            for (raw, label) in &set.labels {
                let value = if variable.is_numeric() {
                    LabelValue::Number(f64_from_bytes(*raw, header.byte_order))
                } else {
                    LabelValue::Text(decode_text(encoding, raw))
                };
                variable
                    .value_labels
                    .push((value, decode_text(encoding, label)));
            }
        }
    }
}

/// Position of the variable called `name`, by long or short name
fn find_variable(variables: &[Variable], name: &str) -> Option<usize> {
    variables.iter().position(|v| {
        v.name.eq_ignore_ascii_case(name) || v.short_name.eq_ignore_ascii_case(name)
    })
}

fn read_name(cursor: &mut Cursor<'_>, encoding: &'static Encoding) -> Result<String> {
    let len = cursor.read_count("variable name length")?;
    Ok(decode_text(encoding, cursor.take(len, "variable name")?))
}

/// Value labels of strings wider than 8 bytes (extension subtype 21)
fn apply_long_string_labels(
    variables: &mut [Variable],
    data: &[u8],
    encoding: &'static Encoding,
    order: ByteOrder,
) -> Result<()> {
    let mut cursor = Cursor::new(data, order);
    while cursor.remaining() > 0 {
        let name = read_name(&mut cursor, encoding)?;
        cursor.skip(4, "variable width")?;
        let count = cursor.read_count("long string label count")?;
        let mut labels = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let len = cursor.read_count("label value length")?;
            let value = decode_text(encoding, cursor.take(len, "label value")?);
            let len = cursor.read_count("label length")?;
            let label = decode_text(encoding, cursor.take(len, "label")?);
            labels.push((LabelValue::Text(value), label));
        }
        match find_variable(variables, &name) {
            Some(index) => variables[index].value_labels.extend(labels),
            None => warn!("Value labels reference unknown variable {}", name),
        }
    }
    Ok(())
}

/// Missing values of strings wider than 8 bytes (extension subtype 22)
fn apply_long_string_missing(
    variables: &mut [Variable],
    data: &[u8],
    encoding: &'static Encoding,
    order: ByteOrder,
) -> Result<()> {
    let mut cursor = Cursor::new(data, order);
    while cursor.remaining() > 0 {
        let name = read_name(&mut cursor, encoding)?;
        let count = cursor.read_u8("long string missing count")? as usize;
        let len = cursor.read_count("missing value length")?;
        let values = (0..count)
            .map(|_| Ok(decode_text(encoding, cursor.take(len, "missing value")?)))
            .collect::<Result<Vec<String>>>()?;
        match find_variable(variables, &name) {
            Some(index) => variables[index].missing = MissingValues::Text(values),
            None => warn!("Missing values reference unknown variable {}", name),
        }
    }
    Ok(())
}
