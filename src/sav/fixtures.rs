//! Test-only builder producing SPSS system file images.
//!
//! Shared with the integration tests through `#[path]`, so it only depends on
//! external crates, never on `crate::` items.
#![allow(dead_code)]

use flate2::Compression as ZlibLevel;
use flate2::write::ZlibEncoder;
use std::io::Write;

const SYSMIS: f64 = -f64::MAX;
const HIGHEST: f64 = f64::MAX;
const LOWEST: f64 = -1.797_693_134_862_315_5e308;
const BIAS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavCompression {
    None,
    Bytecode,
    Zlib,
}

/// Cell value of a fixture row
#[derive(Debug, Clone, PartialEq)]
pub enum FixtureValue {
    Number(f64),
    Text(String),
    Missing,
}

impl From<f64> for FixtureValue {
    fn from(value: f64) -> Self {
        FixtureValue::Number(value)
    }
}

impl From<&str> for FixtureValue {
    fn from(value: &str) -> Self {
        FixtureValue::Text(value.to_string())
    }
}

#[derive(Debug, Clone)]
struct FixtureVar {
    name: String,
    width: usize,
    format: (u8, u8, u8),
    label: Option<String>,
    missing_discrete: Vec<f64>,
    missing_range: Option<(f64, f64)>,
    missing_text: Vec<String>,
    value_labels: Vec<(f64, String)>,
}

/// One variable record as laid out in the dictionary
struct Segment {
    var: usize,
    short_name: String,
    width: usize,
    data_offset: usize,
    data_len: usize,
    first: bool,
}

#[derive(Debug, Clone)]
pub struct SavBuilder {
    big_endian: bool,
    compression: SavCompression,
    vars: Vec<FixtureVar>,
    rows: Vec<Vec<FixtureValue>>,
    file_label: String,
    encoding: String,
    documents: Vec<String>,
    record_case_count: bool,
    zlib_block_size: usize,
    weight: Option<usize>,
}

impl Default for SavBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SavBuilder {
    pub fn new() -> Self {
        Self {
            big_endian: false,
            compression: SavCompression::None,
            vars: Vec::new(),
            rows: Vec::new(),
            file_label: String::new(),
            encoding: "UTF-8".to_string(),
            documents: Vec::new(),
            record_case_count: true,
            zlib_block_size: 0x3ff000,
            weight: None,
        }
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    pub fn compression(mut self, compression: SavCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn zlib_block_size(mut self, size: usize) -> Self {
        self.zlib_block_size = size;
        self
    }

    pub fn file_label(mut self, label: &str) -> Self {
        self.file_label = label.to_string();
        self
    }

    pub fn encoding(mut self, label: &str) -> Self {
        self.encoding = label.to_string();
        self
    }

    pub fn document(mut self, line: &str) -> Self {
        self.documents.push(line.to_string());
        self
    }

    pub fn unknown_case_count(mut self) -> Self {
        self.record_case_count = false;
        self
    }

    /// Numeric variable with an F8.<decimals> format
    pub fn numeric(self, name: &str, decimals: u8) -> Self {
        self.numeric_with_format(name, 5, 8, decimals)
    }

    pub fn numeric_with_format(mut self, name: &str, code: u8, width: u8, decimals: u8) -> Self {
        self.vars.push(FixtureVar {
            name: name.to_string(),
            width: 0,
            format: (code, width, decimals),
            label: None,
            missing_discrete: Vec::new(),
            missing_range: None,
            missing_text: Vec::new(),
            value_labels: Vec::new(),
        });
        self
    }

    pub fn string(mut self, name: &str, width: usize) -> Self {
        self.vars.push(FixtureVar {
            name: name.to_string(),
            width,
            format: (1, width.min(255) as u8, 0),
            label: None,
            missing_discrete: Vec::new(),
            missing_range: None,
            missing_text: Vec::new(),
            value_labels: Vec::new(),
        });
        self
    }

    /// Variable label for the most recently added variable
    pub fn label(mut self, label: &str) -> Self {
        if let Some(var) = self.vars.last_mut() {
            var.label = Some(label.to_string());
        }
        self
    }

    pub fn missing_values(mut self, values: &[f64]) -> Self {
        if let Some(var) = self.vars.last_mut() {
            var.missing_discrete = values.to_vec();
        }
        self
    }

    pub fn missing_range(mut self, low: f64, high: f64) -> Self {
        if let Some(var) = self.vars.last_mut() {
            var.missing_range = Some((low, high));
        }
        self
    }

    pub fn missing_text(mut self, values: &[&str]) -> Self {
        if let Some(var) = self.vars.last_mut() {
            var.missing_text = values.iter().map(|v| v.to_string()).collect();
        }
        self
    }

    pub fn value_labels(mut self, labels: &[(f64, &str)]) -> Self {
        if let Some(var) = self.vars.last_mut() {
            var.value_labels = labels.iter().map(|(v, l)| (*v, l.to_string())).collect();
        }
        self
    }

    /// Use the most recently added variable as the case weight
    pub fn weight(mut self) -> Self {
        self.weight = self.vars.len().checked_sub(1);
        self
    }

    pub fn row(mut self, values: Vec<FixtureValue>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let segments = self.segments();
        let element_count: usize = segments.iter().map(|s| elements(s.width)).sum();

        let mut out = Vec::new();
        self.write_header(&mut out, element_count, &segments);
        self.write_dictionary(&mut out, &segments);

        let elements = self.case_elements(&segments);
        match self.compression {
            SavCompression::None => {
                for (_, raw) in elements {
                    out.extend_from_slice(&raw);
                }
            }
            SavCompression::Bytecode => out.extend(self.bytecode(&elements)),
            SavCompression::Zlib => {
                let stream = self.bytecode(&elements);
                self.write_zlib(&mut out, &stream);
            }
        }
        out
    }

    fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::new();
        for (index, var) in self.vars.iter().enumerate() {
            let short_name = format!("VAR{:05}", index + 1);
            if var.width <= 255 {
                segments.push(Segment {
                    var: index,
                    short_name,
                    width: var.width,
                    data_offset: 0,
                    data_len: var.width,
                    first: true,
                });
                continue;
            }
            let count = var.width.div_ceil(252);
            for segment in 0..count {
                let last = segment == count - 1;
                let width = if last { var.width - 252 * segment } else { 255 };
                segments.push(Segment {
                    var: index,
                    short_name: if segment == 0 {
                        short_name.clone()
                    } else {
                        format!("SEG{:02}{:03}", segment, index + 1)
                    },
                    width,
                    data_offset: 252 * segment,
                    data_len: if last { width } else { 252 },
                    first: segment == 0,
                });
            }
        }
        segments
    }

    fn encode(&self, text: &str) -> Vec<u8> {
        match encoding_rs::Encoding::for_label(self.encoding.as_bytes()) {
            Some(encoding) => encoding.encode(text).0.into_owned(),
            None => text.as_bytes().to_vec(),
        }
    }

    fn i32(&self, out: &mut Vec<u8>, value: i32) {
        if self.big_endian {
            out.extend_from_slice(&value.to_be_bytes());
        } else {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }

    fn i64(&self, out: &mut Vec<u8>, value: i64) {
        if self.big_endian {
            out.extend_from_slice(&value.to_be_bytes());
        } else {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }

    fn f64_bytes(&self, value: f64) -> [u8; 8] {
        if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        }
    }

    fn write_header(&self, out: &mut Vec<u8>, element_count: usize, segments: &[Segment]) {
        out.extend_from_slice(if self.compression == SavCompression::Zlib {
            b"$FL3"
        } else {
            b"$FL2"
        });
        out.extend(padded(b"@(#) SPSS DATA FILE sav_converter fixture", 60));
        self.i32(out, 2);
        self.i32(out, element_count as i32);
        self.i32(
            out,
            match self.compression {
                SavCompression::None => 0,
                SavCompression::Bytecode => 1,
                SavCompression::Zlib => 2,
            },
        );
        let weight_index = self.weight.map_or(0, |var| {
            let mut element = 1;
            for segment in segments {
                if segment.var == var {
                    break;
                }
                element += elements(segment.width);
            }
            element as i32
        });
        self.i32(out, weight_index);
        self.i32(
            out,
            if self.record_case_count {
                self.rows.len() as i32
            } else {
                -1
            },
        );
        out.extend_from_slice(&self.f64_bytes(BIAS));
        out.extend_from_slice(b"05 Mar 24");
        out.extend_from_slice(b"14:30:00");
        out.extend(padded(&self.encode(&self.file_label), 64));
        out.extend_from_slice(&[0, 0, 0]);
    }

    fn write_dictionary(&self, out: &mut Vec<u8>, segments: &[Segment]) {
        let mut element = 1usize;
        let mut label_records = Vec::new();

        for segment in segments {
            let var = &self.vars[segment.var];
            let (code, width, decimals) = var.format;
            let packed = ((code as i32) << 16) | ((width as i32) << 8) | decimals as i32;
            let packed = if var.width > 0 {
                (1 << 16) | ((segment.width.min(255) as i32) << 8)
            } else {
                packed
            };

            self.i32(out, 2);
            self.i32(out, segment.width as i32);
            let label = var.label.as_ref().filter(|_| segment.first);
            self.i32(out, label.is_some() as i32);
            let missing_count = if !segment.first {
                0
            } else if var.width > 0 {
                var.missing_text.len() as i32
            } else {
                match var.missing_range {
                    Some(_) if var.missing_discrete.is_empty() => -2,
                    Some(_) => -3,
                    None => var.missing_discrete.len() as i32,
                }
            };
            self.i32(out, missing_count);
            self.i32(out, packed);
            self.i32(out, packed);
            out.extend(padded(segment.short_name.as_bytes(), 8));

            if let Some(label) = label {
                let bytes = self.encode(label);
                self.i32(out, bytes.len() as i32);
                out.extend(padded(&bytes, bytes.len().div_ceil(4) * 4));
            }
            if missing_count != 0 {
                if var.width > 0 {
                    for value in &var.missing_text {
                        out.extend(padded(&self.encode(value), 8));
                    }
                } else {
                    if let Some((low, high)) = var.missing_range {
                        out.extend_from_slice(&self.f64_bytes(low));
                        out.extend_from_slice(&self.f64_bytes(high));
                    }
                    for value in &var.missing_discrete {
                        out.extend_from_slice(&self.f64_bytes(*value));
                    }
                }
            }

            for _ in 1..elements(segment.width) {
                self.i32(out, 2);
                self.i32(out, -1);
                self.i32(out, 0);
                self.i32(out, 0);
                self.i32(out, 0);
                self.i32(out, 0);
                out.extend_from_slice(b"        ");
            }

            if segment.first && !var.value_labels.is_empty() {
                label_records.push((element, var.value_labels.clone()));
            }
            element += elements(segment.width);
        }

        for (element, labels) in label_records {
            self.i32(out, 3);
            self.i32(out, labels.len() as i32);
            for (value, label) in labels {
                out.extend_from_slice(&self.f64_bytes(value));
                let bytes = self.encode(&label);
                out.push(bytes.len() as u8);
                out.extend(padded(&bytes, (bytes.len() + 1).div_ceil(8) * 8 - 1));
            }
            self.i32(out, 4);
            self.i32(out, 1);
            self.i32(out, element as i32);
        }

        if !self.documents.is_empty() {
            self.i32(out, 6);
            self.i32(out, self.documents.len() as i32);
            for line in &self.documents {
                out.extend(padded(&self.encode(line), 80));
            }
        }

        // Machine integer info
        self.i32(out, 7);
        self.i32(out, 3);
        self.i32(out, 4);
        self.i32(out, 8);
        for value in [20, 0, 0, -1, 1, 1, if self.big_endian { 1 } else { 2 }, 65001] {
            self.i32(out, value);
        }

        // Machine float info
        self.i32(out, 7);
        self.i32(out, 4);
        self.i32(out, 8);
        self.i32(out, 3);
        for value in [SYSMIS, HIGHEST, LOWEST] {
            out.extend_from_slice(&self.f64_bytes(value));
        }

        // Long variable names
        let names = segments
            .iter()
            .filter(|s| s.first)
            .map(|s| {
                let mut entry = format!("{}=", s.short_name).into_bytes();
                entry.extend(self.encode(&self.vars[s.var].name));
                entry
            })
            .collect::<Vec<_>>()
            .join(&b'\t');
        self.i32(out, 7);
        self.i32(out, 13);
        self.i32(out, 1);
        self.i32(out, names.len() as i32);
        out.extend(names);

        // Very long strings
        let very_long: Vec<u8> = segments
            .iter()
            .filter(|s| s.first && self.vars[s.var].width > 255)
            .flat_map(|s| format!("{}={:05}\0\t", s.short_name, self.vars[s.var].width).into_bytes())
            .collect();
        if !very_long.is_empty() {
            self.i32(out, 7);
            self.i32(out, 14);
            self.i32(out, 1);
            self.i32(out, very_long.len() as i32);
            out.extend(very_long);
        }

        // Character encoding
        self.i32(out, 7);
        self.i32(out, 20);
        self.i32(out, 1);
        self.i32(out, self.encoding.len() as i32);
        out.extend_from_slice(self.encoding.as_bytes());

        self.i32(out, 999);
        self.i32(out, 0);
    }

    /// Every case element tagged with whether it belongs to a numeric variable
    fn case_elements(&self, segments: &[Segment]) -> Vec<(bool, [u8; 8])> {
        let mut result = Vec::new();
        for row in &self.rows {
            for segment in segments {
                let value = row.get(segment.var).cloned().unwrap_or(FixtureValue::Missing);
                if segment.width == 0 {
                    let number = match value {
                        FixtureValue::Number(n) => n,
                        _ => SYSMIS,
                    };
                    result.push((true, self.f64_bytes(number)));
                    continue;
                }
                let text = match value {
                    FixtureValue::Text(s) => self.encode(&s),
                    _ => Vec::new(),
                };
                let end = (segment.data_offset + segment.data_len).min(text.len());
                let part = if segment.data_offset < text.len() {
                    &text[segment.data_offset..end]
                } else {
                    &[][..]
                };
                let padded = padded(part, elements(segment.width) * 8);
                for chunk in padded.chunks(8) {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(chunk);
                    result.push((false, raw));
                }
            }
        }
        result
    }

    fn bytecode(&self, elements: &[(bool, [u8; 8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for block in elements.chunks(8) {
            let mut codes = [0u8; 8];
            let mut raw_data = Vec::new();
            for (slot, (numeric, raw)) in block.iter().enumerate() {
                codes[slot] = if *numeric {
                    let value = if self.big_endian {
                        f64::from_be_bytes(*raw)
                    } else {
                        f64::from_le_bytes(*raw)
                    };
                    if value == SYSMIS {
                        255
                    } else if value.fract() == 0.0 && (1.0 - BIAS..=251.0 - BIAS).contains(&value)
                    {
                        (value + BIAS) as u8
                    } else {
                        raw_data.extend_from_slice(raw);
                        253
                    }
                } else if raw == b"        " {
                    254
                } else {
                    raw_data.extend_from_slice(raw);
                    253
                };
            }
            if block.len() < 8 {
                codes[block.len()] = 252;
            }
            out.extend_from_slice(&codes);
            out.extend(raw_data);
        }
        out
    }

    fn write_zlib(&self, out: &mut Vec<u8>, stream: &[u8]) {
        let zheader_offset = out.len();
        let mut blocks = Vec::new();
        for chunk in stream.chunks(self.zlib_block_size.max(1)) {
            let mut encoder = ZlibEncoder::new(Vec::new(), ZlibLevel::default());
            encoder.write_all(chunk).expect("in-memory zlib write");
            blocks.push((chunk.len(), encoder.finish().expect("in-memory zlib finish")));
        }

        let compressed_len: usize = blocks.iter().map(|(_, c)| c.len()).sum();
        let trailer_offset = zheader_offset + 24 + compressed_len;
        let trailer_len = 24 + 24 * blocks.len();

        self.i64(out, zheader_offset as i64);
        self.i64(out, trailer_offset as i64);
        self.i64(out, trailer_len as i64);

        let mut entries = Vec::new();
        let mut uncompressed_offset = zheader_offset;
        let mut compressed_offset = zheader_offset + 24;
        for (raw_len, compressed) in &blocks {
            entries.push((uncompressed_offset, compressed_offset, *raw_len, compressed.len()));
            uncompressed_offset += raw_len;
            compressed_offset += compressed.len();
            out.extend_from_slice(compressed);
        }

        self.i64(out, -(BIAS as i64));
        self.i64(out, 0);
        self.i32(out, self.zlib_block_size as i32);
        self.i32(out, blocks.len() as i32);
        for (uncompressed, compressed, raw_len, compressed_len) in entries {
            self.i64(out, uncompressed as i64);
            self.i64(out, compressed as i64);
            self.i32(out, raw_len as i32);
            self.i32(out, compressed_len as i32);
        }
    }
}

fn elements(width: usize) -> usize {
    if width == 0 { 1 } else { width.div_ceil(8) }
}

fn padded(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut out = bytes[..bytes.len().min(len)].to_vec();
    out.resize(len, b' ');
    out
}
