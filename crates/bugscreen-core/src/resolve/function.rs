use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::{Address, ReadMemory};
use crate::resolve::ScanBuffer;
use crate::resolve::displacement::{DISPLACEMENT_WIDTH, relative_target};
use crate::signature::{Signature, match_signatures, max_window_len};

/// Scan forward from `anchor` for the first call/lea matching one of
/// `signatures` and decode its target
///
/// The cursor advances one byte at a time. Stops with `SignatureNotFound` when
/// `sentinel` matches first, and with `ScanBoundsExceeded` when neither shows up
/// within `max_scan` bytes.
pub fn resolve_function<R: ReadMemory + ?Sized>(
    reader: &R,
    anchor: Address,
    signatures: &[Signature],
    sentinel: &Signature,
    max_scan: usize,
) -> Result<Address> {
    let name = || {
        signatures
            .iter()
            .map(Signature::name)
            .collect::<Vec<_>>()
            .join("|")
    };

    let lookahead = max_window_len(signatures.iter().chain([sentinel])) + DISPLACEMENT_WIDTH as usize;
    let buffer = ScanBuffer::read(reader, anchor, max_scan.saturating_add(lookahead))?;

    for offset in 0..max_scan {
        if offset >= buffer.len() {
            return Err(buffer.past_end(offset));
        }
        let window = buffer.window(offset);

        if let Some(found) = match_signatures(window, signatures) {
            let field = offset + found.len;
            let displacement = buffer.i32_at(field)?;
            let target = relative_target(buffer.address(field), displacement);
            debug!(
                "  '{}' matched at {} (+0x{:X}), displacement {:#x} -> {}",
                signatures[found.index].name(),
                buffer.address(offset),
                offset,
                displacement,
                target
            );
            return Ok(target);
        }

        if sentinel.match_window(window).is_some() {
            debug!(
                "  Reached '{}' at {} without a match",
                sentinel.name(),
                buffer.address(offset)
            );
            return Err(Error::SignatureNotFound {
                name: name(),
                scanned: offset,
            });
        }
    }

    Err(Error::ScanBoundsExceeded {
        name: name(),
        max_scan,
    })
}
