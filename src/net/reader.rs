//! Inbound payload reader

use crate::util::cp1252;

/// Errors raised while decoding an inbound payload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("payload truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("string is missing its terminator")]
    UnterminatedString,
}

/// Cursor over one inbound message payload
pub struct PacketReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Read n bytes
    pub fn read(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.data.len() - self.position;
        if n > remaining {
            return Err(DecodeError::Truncated { needed: n, remaining });
        }
        let slice = &self.data[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.read(1).map(|b| b[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.read(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a zero-terminated string in the client's text encoding
    pub fn read_str(&mut self) -> Result<String, DecodeError> {
        let rest = &self.data[self.position..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::UnterminatedString)?;
        self.position += end + 1;
        Ok(cp1252::decode(&rest[..end]))
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.data.len()
    }
}
