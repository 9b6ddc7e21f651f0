//! Big-endian binary data stream.
//!
//! [`DataWriter`] and [`DataReader`] follow the layout of a classic
//! Qt-style data stream so saved sessions stay readable across versions:
//!
//! | Type | Encoding |
//! |------|----------|
//! | `i32` / `u32` / `i64` | big-endian, fixed width |
//! | `bool` | one byte, `0` or `1` |
//! | string | `u32` byte length, then UTF-16BE code units (`0xFFFFFFFF` = null) |
//! | string list | `u32` count, then strings |
//! | byte array | `u32` length, then raw bytes (`0xFFFFFFFF` = null) |

use super::error::CodecError;

const NULL_MARKER: u32 = u32::MAX;

/// Append-only writer over an owned byte buffer.
#[derive(Debug, Default)]
pub struct DataWriter {
    buf: Vec<u8>,
}

impl DataWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_string(&mut self, value: &str) -> Result<(), CodecError> {
        let units: Vec<u16> = value.encode_utf16().collect();
        let byte_len = units
            .len()
            .checked_mul(2)
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n != NULL_MARKER)
            .ok_or(CodecError::TooLarge("string"))?;
        self.write_u32(byte_len);
        for unit in units {
            self.buf.extend_from_slice(&unit.to_be_bytes());
        }
        Ok(())
    }

    pub fn write_string_list(&mut self, values: &[String]) -> Result<(), CodecError> {
        let count = u32::try_from(values.len()).map_err(|_| CodecError::TooLarge("string list"))?;
        self.write_u32(count);
        for value in values {
            self.write_string(value)?;
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), CodecError> {
        let len = u32::try_from(value.len())
            .ok()
            .filter(|n| *n != NULL_MARKER)
            .ok_or(CodecError::TooLarge("byte array"))?;
        self.write_u32(len);
        self.buf.extend_from_slice(value);
        Ok(())
    }

    /// Append bytes verbatim, without a length prefix.
    pub fn write_raw(&mut self, value: &[u8]) {
        self.buf.extend_from_slice(value);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor-based reader over a borrowed byte slice.
///
/// Every read either consumes exactly the bytes it decodes or fails with
/// [`CodecError::UnexpectedEof`] / [`CodecError::Corrupt`] without advancing.
#[derive(Debug)]
pub struct DataReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DataReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(CodecError::UnexpectedEof { offset: self.pos })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        let offset = self.pos;
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => {
                self.pos = offset;
                Err(CodecError::Corrupt(format!(
                    "invalid bool byte {other:#04x} at offset {offset}"
                )))
            }
        }
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let start = self.pos;
        let len = self.read_u32()?;
        if len == NULL_MARKER {
            return Ok(String::new());
        }
        if len % 2 != 0 {
            self.pos = start;
            return Err(CodecError::Corrupt(format!(
                "odd UTF-16 byte length {len} at offset {start}"
            )));
        }
        let raw = match self.take(len as usize) {
            Ok(raw) => raw,
            Err(e) => {
                self.pos = start;
                return Err(e);
            }
        };
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).map_err(|_| {
            self.pos = start;
            CodecError::Corrupt(format!("invalid UTF-16 string at offset {start}"))
        })
    }

    pub fn read_string_list(&mut self) -> Result<Vec<String>, CodecError> {
        let start = self.pos;
        let count = self.read_u32()?;
        let mut values = Vec::new();
        for _ in 0..count {
            match self.read_string() {
                Ok(value) => values.push(value),
                Err(e) => {
                    self.pos = start;
                    return Err(e);
                }
            }
        }
        Ok(values)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let start = self.pos;
        let len = self.read_u32()?;
        if len == NULL_MARKER {
            return Ok(Vec::new());
        }
        match self.take(len as usize) {
            Ok(raw) => Ok(raw.to_vec()),
            Err(e) => {
                self.pos = start;
                Err(e)
            }
        }
    }

    /// Current offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }
}
