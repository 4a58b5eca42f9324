//! PE32+ image loaded from disk into image layout.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use object::{Object, ObjectSection, SectionFlags};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::memory::{Address, Protection, Region, RegionSpace};
use crate::resolve::AnchorResolver;

/// Exported names of an image and their virtual addresses
#[derive(Debug, Clone, Default)]
pub struct ExportTable {
    exports: BTreeMap<String, Address>,
}

impl ExportTable {
    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

impl FromIterator<(String, Address)> for ExportTable {
    fn from_iter<I: IntoIterator<Item = (String, Address)>>(iter: I) -> Self {
        Self {
            exports: iter.into_iter().collect(),
        }
    }
}

impl AnchorResolver for ExportTable {
    fn resolve_anchor(&self, name: &str) -> Option<Address> {
        self.exports.get(name).copied()
    }
}

/// A PE32+ file whose sections are laid out at their preferred virtual addresses
#[derive(Debug)]
pub struct PeImage {
    file: Vec<u8>,
    image_base: Address,
    space: RegionSpace,
    exports: ExportTable,
}

impl PeImage {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(&path)?;
        info!("Loaded image {} ({} bytes)", path.as_ref().display(), data.len());
        Self::parse(data)
    }

    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let (image_base, space, exports) = {
            let file = object::File::parse(&*data)?;
            if !matches!(file, object::File::Pe64(_)) {
                return Err(Error::Image("not a PE32+ image".to_string()));
            }

            let image_base = Address::new(file.relative_address_base());
            let mut builder = RegionSpace::builder();

            for section in file.sections() {
                let name = section.name().unwrap_or("<invalid>").to_string();
                let raw = section.data()?;
                let size = (section.size() as usize).max(raw.len());
                if size == 0 {
                    debug!("  Skipping empty section {}", name);
                    continue;
                }

                let mut bytes = vec![0u8; size];
                bytes[..raw.len()].copy_from_slice(raw);

                let protection = match section.flags() {
                    SectionFlags::Coff { characteristics } => {
                        Protection::from_characteristics(characteristics)
                    }
                    _ => Protection::ReadOnly,
                };
                debug!(
                    "  Section {:<8} at 0x{:X} ({} bytes, {})",
                    name,
                    section.address(),
                    size,
                    protection
                );

                let mut region = Region::new(name, Address::new(section.address()), bytes, protection);
                region.file_range = section.file_range();
                builder = builder.region(region);
            }

            let exports: ExportTable = file
                .exports()?
                .into_iter()
                .map(|export| {
                    (
                        String::from_utf8_lossy(export.name()).into_owned(),
                        Address::new(export.address()),
                    )
                })
                .collect();

            (image_base, builder.build()?, exports)
        };

        debug!(
            "Image base {} with {} sections and {} exports",
            image_base,
            space.regions().len(),
            exports.len()
        );

        Ok(Self {
            file: data,
            image_base,
            space,
            exports,
        })
    }

    pub fn image_base(&self) -> Address {
        self.image_base
    }

    pub fn space(&self) -> &RegionSpace {
        &self.space
    }

    pub fn exports(&self) -> &ExportTable {
        &self.exports
    }

    /// Borrow the address space mutably alongside the export table
    pub fn split_mut(&mut self) -> (&mut RegionSpace, &ExportTable) {
        (&mut self.space, &self.exports)
    }

    /// The original file with every region's current bytes copied back into
    /// its raw section data
    pub fn write_back(&self) -> Vec<u8> {
        let mut out = self.file.clone();
        for region in self.space.regions() {
            let Some((offset, size)) = region.file_range else {
                continue;
            };
            let offset = offset as usize;
            let len = (size as usize).min(region.bytes.len());
            if offset + len > out.len() {
                continue;
            }
            out[offset..offset + len].copy_from_slice(&region.bytes[..len]);
        }
        out
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(&path, self.write_back())?;
        info!("Wrote patched image to {}", path.as_ref().display());
        Ok(())
    }
}
