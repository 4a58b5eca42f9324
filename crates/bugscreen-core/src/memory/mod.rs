mod address;
mod image;
#[cfg(target_os = "windows")]
mod kernel;
mod mapping;
mod reader;
mod region;

pub use address::{Address, parse_hex};
pub use image::{ExportTable, PeImage};
#[cfg(target_os = "windows")]
pub use kernel::running_kernel_base;
pub use mapping::{MappingProvider, MappingStats, WritableView};
pub use reader::ReadMemory;
pub use region::{Protection, Region, RegionMapping, RegionSpace, RegionSpaceBuilder};
