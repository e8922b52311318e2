//! Bounds-checked reader over the raw bytes of a system file.

use crate::error::{ConvertError, Result};
use crate::models::ByteOrder;

pub(crate) struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    order: ByteOrder,
}

impl<'a> Cursor<'a> {
    pub fn new(bytes: &'a [u8], order: ByteOrder) -> Self {
        Self {
            bytes,
            pos: 0,
            order,
        }
    }

    pub fn at(bytes: &'a [u8], pos: usize, order: ByteOrder) -> Result<Self> {
        if pos > bytes.len() {
            return Err(ConvertError::parse(format!(
                "offset {} lies beyond the end of the file ({} bytes)",
                pos,
                bytes.len()
            )));
        }
        Ok(Self { bytes, pos, order })
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ConvertError::parse(format!(
                "unexpected end of file reading {} at offset {} (need {} bytes, {} left)",
                what,
                self.pos,
                len,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize, what: &str) -> Result<()> {
        self.take(len, what).map(|_| ())
    }

    pub fn read_u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub fn read_i32(&mut self, what: &str) -> Result<i32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4, what)?);
        Ok(match self.order {
            ByteOrder::Little => i32::from_le_bytes(buf),
            ByteOrder::Big => i32::from_be_bytes(buf),
        })
    }

    pub fn read_i64(&mut self, what: &str) -> Result<i64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8, what)?);
        Ok(match self.order {
            ByteOrder::Little => i64::from_le_bytes(buf),
            ByteOrder::Big => i64::from_be_bytes(buf),
        })
    }

    pub fn read_f64(&mut self, what: &str) -> Result<f64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8, what)?);
        Ok(f64_from_bytes(buf, self.order))
    }

    /// Length read as a non-negative i32 count
    pub fn read_count(&mut self, what: &str) -> Result<usize> {
        let value = self.read_i32(what)?;
        usize::try_from(value)
            .map_err(|_| ConvertError::parse(format!("negative {} ({})", what, value)))
    }
}

pub(crate) fn f64_from_bytes(buf: [u8; 8], order: ByteOrder) -> f64 {
    match order {
        ByteOrder::Little => f64::from_le_bytes(buf),
        ByteOrder::Big => f64::from_be_bytes(buf),
    }
}
