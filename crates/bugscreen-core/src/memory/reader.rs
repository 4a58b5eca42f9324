use std::ops::Range;

use crate::error::{Error, Result};
use crate::memory::Address;

/// Raw reads against the mapped range of the target image
pub trait ReadMemory {
    /// Read exactly `size` bytes at `address`
    fn read_bytes(&self, address: Address, size: usize) -> Result<Vec<u8>>;

    /// Read up to `size` bytes at `address`, stopping early at the end of the
    /// backing region. Fails only if `address` itself is unmapped.
    fn read_available(&self, address: Address, size: usize) -> Result<Vec<u8>>;

    /// Whether `len` bytes at `address` are readable
    fn contains(&self, address: Address, len: usize) -> bool;

    /// Span of the whole mapped module, if the backend knows it
    fn mapped_range(&self) -> Option<Range<Address>> {
        None
    }

    fn read_u8(&self, address: Address) -> Result<u8> {
        let bytes = self.read_bytes(address, 1)?;
        Ok(bytes[0])
    }

    fn read_u16(&self, address: Address) -> Result<u16> {
        let bytes = self.read_bytes(address, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&self, address: Address) -> Result<u32> {
        let bytes = self.read_bytes(address, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&self, address: Address) -> Result<u64> {
        let bytes = self.read_bytes(address, 8)?;
        let array: [u8; 8] = bytes.try_into().map_err(|_| Error::MemoryReadFailed {
            address: address.get(),
            message: "short read".to_string(),
        })?;
        Ok(u64::from_le_bytes(array))
    }

    /// Read a little-endian unsigned value of `width` bytes (1, 2, 4 or 8)
    fn read_uint(&self, address: Address, width: usize) -> Result<u64> {
        match width {
            1 => self.read_u8(address).map(u64::from),
            2 => self.read_u16(address).map(u64::from),
            4 => self.read_u32(address).map(u64::from),
            8 => self.read_u64(address),
            _ => Err(Error::InvalidChain(format!(
                "unsupported dereference width {}",
                width
            ))),
        }
    }
}
