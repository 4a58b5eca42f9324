use serde::Serialize;

use crate::descriptor::{CountedString, HEADER_LEN, LENGTH_OFFSET, encode_utf16le};
use crate::error::{Error, Result};
use crate::memory::{Address, ReadMemory};

/// One bounded write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubWrite {
    pub address: Address,
    /// Declared capacity of the target field
    pub max_len: usize,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl SubWrite {
    pub fn new(address: Address, max_len: usize, bytes: Vec<u8>) -> Self {
        Self {
            address,
            max_len,
            bytes,
        }
    }
}

/// Ordered writes that together replace one value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchRequest {
    pub name: String,
    pub writes: Vec<SubWrite>,
}

impl PatchRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            writes: Vec::new(),
        }
    }

    pub fn write(mut self, address: Address, max_len: usize, bytes: Vec<u8>) -> Self {
        self.writes.push(SubWrite::new(address, max_len, bytes));
        self
    }

    /// Replace the text of the counted string at `descriptor`
    ///
    /// Writes the length fields first, then the new text into the buffer the
    /// descriptor already points at. `max_units` is the buffer capacity in
    /// UTF-16 code units; the text is NUL-terminated when it leaves room.
    pub fn string<R: ReadMemory + ?Sized>(
        reader: &R,
        name: impl Into<String>,
        descriptor: Address,
        text: &str,
        max_units: usize,
    ) -> Result<Self> {
        let name = name.into();
        let current = CountedString::read(reader, descriptor)?;
        let capacity = max_units.saturating_mul(2);
        let mut payload = encode_utf16le(text);

        let byte_len = u16::try_from(payload.len()).map_err(|_| Error::PayloadTooLarge {
            name: name.clone(),
            len: payload.len(),
            max_len: u16::MAX as usize,
        })?;
        let header_capacity = u16::try_from(capacity).unwrap_or(u16::MAX);
        let header = CountedString::header_for(byte_len, header_capacity);

        if payload.len() + 2 <= capacity {
            payload.extend_from_slice(&[0, 0]);
        }

        Ok(Self::new(name)
            .write(descriptor.add(LENGTH_OFFSET), HEADER_LEN, header.to_vec())
            .write(current.buffer, capacity, payload))
    }

    /// Single little-endian `u32` store
    pub fn scalar_u32(name: impl Into<String>, address: Address, value: u32) -> Self {
        Self::new(name).write(address, size_of::<u32>(), value.to_le_bytes().to_vec())
    }

    /// Reject any sub-write longer than its declared capacity
    pub fn validate(&self) -> Result<()> {
        for write in &self.writes {
            if write.bytes.len() > write.max_len {
                return Err(Error::PayloadTooLarge {
                    name: self.name.clone(),
                    len: write.bytes.len(),
                    max_len: write.max_len,
                });
            }
        }
        Ok(())
    }

    pub fn total_len(&self) -> usize {
        self.writes.iter().map(|write| write.bytes.len()).sum()
    }
}
