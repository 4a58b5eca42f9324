//! Counted UTF-16 string descriptors as laid out in the kernel image.
//!
//! ```text
//! +0  u16  length          (bytes, no terminator)
//! +2  u16  maximum_length  (bytes)
//! +4       padding
//! +8  u64  buffer
//! ```

use crate::error::Result;
use crate::memory::{Address, ReadMemory};

pub const DESCRIPTOR_SIZE: usize = 16;
pub const LENGTH_OFFSET: u64 = 0;
pub const MAXIMUM_LENGTH_OFFSET: u64 = 2;
pub const BUFFER_OFFSET: u64 = 8;
/// Both length fields
pub const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountedString {
    pub length: u16,
    pub maximum_length: u16,
    pub buffer: Address,
}

impl CountedString {
    pub fn read<R: ReadMemory + ?Sized>(reader: &R, address: Address) -> Result<Self> {
        Ok(Self {
            length: reader.read_u16(address.add(LENGTH_OFFSET))?,
            maximum_length: reader.read_u16(address.add(MAXIMUM_LENGTH_OFFSET))?,
            buffer: Address::new(reader.read_u64(address.add(BUFFER_OFFSET))?),
        })
    }

    /// Raw UTF-16LE bytes the descriptor currently points at
    pub fn text_bytes<R: ReadMemory + ?Sized>(&self, reader: &R) -> Result<Vec<u8>> {
        reader.read_bytes(self.buffer, self.length as usize)
    }

    pub fn text<R: ReadMemory + ?Sized>(&self, reader: &R) -> Result<String> {
        Ok(decode_utf16le(&self.text_bytes(reader)?))
    }

    /// Header bytes for a string of `byte_len` bytes in a buffer of `capacity`
    /// bytes. The maximum length counts a terminator only when the buffer has
    /// room for one.
    pub fn header_for(byte_len: u16, capacity: u16) -> [u8; HEADER_LEN] {
        let maximum_length = byte_len.saturating_add(2).min(capacity.max(byte_len));
        let mut header = [0u8; HEADER_LEN];
        header[..2].copy_from_slice(&byte_len.to_le_bytes());
        header[2..].copy_from_slice(&maximum_length.to_le_bytes());
        header
    }
}

pub fn encode_utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

pub fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Whether UTF-16LE `haystack` contains `needle` at a character boundary
pub fn contains_utf16(haystack: &[u8], needle: &str) -> bool {
    let needle = encode_utf16le(needle);
    if needle.is_empty() {
        return true;
    }
    memchr::memmem::find_iter(haystack, &needle).any(|offset| offset % 2 == 0)
}

#[cfg(test)]
pub(crate) mod fixture {
    use super::*;

    /// Serialize a descriptor pointing at `buffer`
    pub fn descriptor_bytes(length: u16, maximum_length: u16, buffer: u64) -> [u8; DESCRIPTOR_SIZE] {
        let mut bytes = [0u8; DESCRIPTOR_SIZE];
        bytes[0..2].copy_from_slice(&length.to_le_bytes());
        bytes[2..4].copy_from_slice(&maximum_length.to_le_bytes());
        bytes[8..16].copy_from_slice(&buffer.to_le_bytes());
        bytes
    }
}
