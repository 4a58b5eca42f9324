//! In-memory address space made of protected regions.
//!
//! Backs both offline image analysis (sections of a PE file laid out at their
//! virtual addresses) and tests. Writable mappings alias region storage directly,
//! so a read-only region can be patched without its `Protection` ever changing.

use std::ops::Range;

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::{Address, MappingProvider, MappingStats, ReadMemory, WritableView};

/// Page protection of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, strum::Display)]
pub enum Protection {
    NoAccess,
    ReadOnly,
    #[default]
    ReadWrite,
    Execute,
    ExecuteRead,
    ExecuteReadWrite,
}

impl Protection {
    const SCN_MEM_EXECUTE: u32 = 0x2000_0000;
    const SCN_MEM_READ: u32 = 0x4000_0000;
    const SCN_MEM_WRITE: u32 = 0x8000_0000;

    /// Derive protection from COFF section characteristics
    pub fn from_characteristics(characteristics: u32) -> Self {
        let x = characteristics & Self::SCN_MEM_EXECUTE != 0;
        let r = characteristics & Self::SCN_MEM_READ != 0;
        let w = characteristics & Self::SCN_MEM_WRITE != 0;
        match (x, r, w) {
            (false, false, false) => Self::NoAccess,
            (false, _, false) => Self::ReadOnly,
            (false, _, true) => Self::ReadWrite,
            (true, false, false) => Self::Execute,
            (true, true, false) => Self::ExecuteRead,
            (true, _, true) => Self::ExecuteReadWrite,
        }
    }

    pub fn is_readable(self) -> bool {
        !matches!(self, Self::NoAccess | Self::Execute)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, Self::ReadWrite | Self::ExecuteReadWrite)
    }
}

/// A contiguous mapped range
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub base: Address,
    pub bytes: Vec<u8>,
    pub protection: Protection,
    /// Where the region's initialized bytes live in the source file, if any
    pub file_range: Option<(u64, u64)>,
}

impl Region {
    pub fn new(name: impl Into<String>, base: Address, bytes: Vec<u8>, protection: Protection) -> Self {
        Self {
            name: name.into(),
            base,
            bytes,
            protection,
            file_range: None,
        }
    }

    pub fn end(&self) -> Address {
        self.base.add(self.bytes.len() as u64)
    }

    pub fn contains(&self, address: Address) -> bool {
        address >= self.base && address < self.end()
    }
}

/// Address space over a sorted set of non-overlapping regions
#[derive(Debug, Default)]
pub struct RegionSpace {
    regions: Vec<Region>,
    stats: MappingStats,
    failing: Vec<Address>,
}

impl RegionSpace {
    pub fn builder() -> RegionSpaceBuilder {
        RegionSpaceBuilder::default()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn mapping_stats(&self) -> MappingStats {
        self.stats
    }

    /// Lowest region start to highest region end
    pub fn range(&self) -> Option<Range<Address>> {
        let first = self.regions.first()?;
        let last = self.regions.last()?;
        Some(first.base..last.end())
    }

    /// Make any mapping that starts at `address` fail
    pub fn fail_mapping_at(&mut self, address: Address) {
        self.failing.push(address);
    }

    pub fn region_at(&self, address: Address) -> Option<&Region> {
        self.locate(address).map(|(index, _)| &self.regions[index])
    }

    fn locate(&self, address: Address) -> Option<(usize, usize)> {
        let index = self
            .regions
            .partition_point(|region| region.base <= address)
            .checked_sub(1)?;
        let region = &self.regions[index];
        region
            .contains(address)
            .then(|| (index, address.distance_from(region.base) as usize))
    }

    fn read_failed(address: Address, message: impl Into<String>) -> Error {
        Error::MemoryReadFailed {
            address: address.get(),
            message: message.into(),
        }
    }
}

impl ReadMemory for RegionSpace {
    fn read_bytes(&self, address: Address, size: usize) -> Result<Vec<u8>> {
        let bytes = self.read_available(address, size)?;
        if bytes.len() < size {
            return Err(Self::read_failed(
                address,
                format!("read of {} bytes crosses the end of the region", size),
            ));
        }
        Ok(bytes)
    }

    fn read_available(&self, address: Address, size: usize) -> Result<Vec<u8>> {
        let (index, offset) = self
            .locate(address)
            .ok_or_else(|| Self::read_failed(address, "address is not mapped"))?;
        let region = &self.regions[index];
        if !region.protection.is_readable() {
            return Err(Self::read_failed(
                address,
                format!("region '{}' is {}", region.name, region.protection),
            ));
        }
        let end = offset.saturating_add(size).min(region.bytes.len());
        Ok(region.bytes[offset..end].to_vec())
    }

    fn contains(&self, address: Address, len: usize) -> bool {
        match self.locate(address) {
            Some((index, offset)) => {
                let region = &self.regions[index];
                region.protection.is_readable()
                    && offset
                        .checked_add(len)
                        .is_some_and(|end| end <= region.bytes.len())
            }
            None => false,
        }
    }

    fn mapped_range(&self) -> Option<Range<Address>> {
        self.range()
    }
}

impl MappingProvider for RegionSpace {
    type View<'a> = RegionMapping<'a>;

    fn map_writable(&mut self, address: Address, len: usize) -> Result<RegionMapping<'_>> {
        let mapping_failed = |message: String| Error::MappingFailed {
            address: address.get(),
            len,
            message,
        };

        if self.failing.contains(&address) {
            return Err(mapping_failed("storage could not be mapped".to_string()));
        }

        let (index, offset) = self
            .locate(address)
            .ok_or_else(|| mapping_failed("address is not backed by any region".to_string()))?;

        let Self { regions, stats, .. } = self;
        let region = &mut regions[index];
        let Some(end) = offset.checked_add(len).filter(|end| *end <= region.bytes.len()) else {
            return Err(mapping_failed(format!(
                "range crosses the end of region '{}'",
                region.name
            )));
        };

        debug!(
            "Mapping {} bytes at {} writable (region '{}' stays {})",
            len, address, region.name, region.protection
        );
        stats.on_acquire();

        Ok(RegionMapping {
            address,
            bytes: &mut region.bytes[offset..end],
            stats,
        })
    }
}

/// Writable alias of part of a region, released on drop
#[derive(Debug)]
pub struct RegionMapping<'a> {
    address: Address,
    bytes: &'a mut [u8],
    stats: &'a mut MappingStats,
}

impl WritableView for RegionMapping<'_> {
    fn address(&self) -> Address {
        self.address
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| Error::MappingFailed {
                address: self.address.add(offset as u64).get(),
                len: bytes.len(),
                message: format!("write past the end of a {} byte mapping", self.bytes.len()),
            })?;
        self.bytes[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}

impl Drop for RegionMapping<'_> {
    fn drop(&mut self) {
        self.stats.on_release();
    }
}

/// Builder for [`RegionSpace`]
#[derive(Debug, Default)]
pub struct RegionSpaceBuilder {
    regions: Vec<Region>,
}

impl RegionSpaceBuilder {
    pub fn region(mut self, region: Region) -> Self {
        self.regions.push(region);
        self
    }

    /// Add an anonymous region
    pub fn bytes(self, base: u64, bytes: Vec<u8>, protection: Protection) -> Self {
        let name = format!("region@{:X}", base);
        self.region(Region::new(name, Address::new(base), bytes, protection))
    }

    pub fn build(mut self) -> Result<RegionSpace> {
        self.regions.sort_by_key(|region| region.base);
        for pair in self.regions.windows(2) {
            if pair[0].end() > pair[1].base {
                return Err(Error::Image(format!(
                    "regions '{}' and '{}' overlap",
                    pair[0].name, pair[1].name
                )));
            }
        }
        Ok(RegionSpace {
            regions: self.regions,
            stats: MappingStats::default(),
            failing: Vec::new(),
        })
    }
}
