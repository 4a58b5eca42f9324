use crate::error::Result;
use crate::memory::Address;

/// A temporary writable alias of protected storage
///
/// The alias is released when the view is dropped. Implementations must not
/// change the protection of the original pages.
pub trait WritableView {
    fn address(&self) -> Address;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `bytes` into the view at `offset`
    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()>;
}

/// Hands out writable views of storage backing protected addresses
pub trait MappingProvider {
    type View<'a>: WritableView
    where
        Self: 'a;

    fn map_writable(&mut self, address: Address, len: usize) -> Result<Self::View<'_>>;
}

/// Bookkeeping of mappings handed out by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappingStats {
    pub acquired: usize,
    pub released: usize,
    pub peak_open: usize,
}

impl MappingStats {
    pub fn open(&self) -> usize {
        self.acquired - self.released
    }

    pub(crate) fn on_acquire(&mut self) {
        self.acquired += 1;
        self.peak_open = self.peak_open.max(self.open());
    }

    pub(crate) fn on_release(&mut self) {
        self.released += 1;
    }
}
