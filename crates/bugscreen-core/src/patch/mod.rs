//! Bounded writes into protected storage through scoped writable mappings

mod request;

pub use request::{PatchRequest, SubWrite};

use tracing::{debug, info};

use crate::error::Result;
use crate::memory::{MappingProvider, WritableView};

/// Apply every sub-write of `request` in order
///
/// All capacities are checked before the first mapping is taken. Each sub-write
/// gets its own mapping, dropped before the next one is acquired, so at most one
/// writable alias is open at a time and none survive an error.
pub fn apply_patch<M: MappingProvider + ?Sized>(provider: &mut M, request: &PatchRequest) -> Result<()> {
    request.validate()?;

    for write in &request.writes {
        let mut view = provider.map_writable(write.address, write.bytes.len())?;
        view.write(0, &write.bytes)?;
        debug!(
            "  '{}': wrote {} bytes at {}",
            request.name,
            write.bytes.len(),
            view.address()
        );
    }

    Ok(())
}

/// Validate every request, then apply them in order
///
/// Returns the names of the applied requests.
pub fn apply_all<M: MappingProvider + ?Sized>(
    provider: &mut M,
    requests: &[PatchRequest],
) -> Result<Vec<String>> {
    for request in requests {
        request.validate()?;
    }

    let mut applied = Vec::with_capacity(requests.len());
    for request in requests {
        apply_patch(provider, request)?;
        info!("Patched {} ({} bytes)", request.name, request.total_len());
        applied.push(request.name.clone());
    }
    Ok(applied)
}
