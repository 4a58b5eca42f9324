use crate::error::{Error, Result};
use crate::memory::{Address, ReadMemory};

/// Bytes read once ahead of a forward scan, clipped to the readable region
#[derive(Debug)]
pub(crate) struct ScanBuffer {
    base: Address,
    bytes: Vec<u8>,
}

impl ScanBuffer {
    pub fn read<R: ReadMemory + ?Sized>(reader: &R, base: Address, len: usize) -> Result<Self> {
        let bytes = reader.read_available(base, len)?;
        Ok(Self { base, bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn address(&self, offset: usize) -> Address {
        self.base.add(offset as u64)
    }

    /// Everything from `offset` to the end of the buffer
    pub fn window(&self, offset: usize) -> &[u8] {
        self.bytes.get(offset..).unwrap_or(&[])
    }

    pub fn u8_at(&self, offset: usize) -> Result<u8> {
        self.bytes
            .get(offset)
            .copied()
            .ok_or_else(|| self.past_end(offset))
    }

    pub fn i32_at(&self, offset: usize) -> Result<i32> {
        let raw: [u8; 4] = self
            .bytes
            .get(offset..offset + 4)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| self.past_end(offset))?;
        Ok(i32::from_le_bytes(raw))
    }

    pub fn past_end(&self, offset: usize) -> Error {
        Error::MemoryReadFailed {
            address: self.address(offset).get(),
            message: format!(
                "beyond the {} readable bytes after {}",
                self.bytes.len(),
                self.base
            ),
        }
    }
}
