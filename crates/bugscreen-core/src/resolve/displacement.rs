//! RIP-relative displacement decoding.

use crate::memory::Address;

/// Width of a rel32 field
pub const DISPLACEMENT_WIDTH: u64 = 4;

/// Target of a rel32 field starting at `field`
///
/// The CPU measures from the end of the instruction, which for every shape we
/// match is the end of the field itself.
pub const fn relative_target(field: Address, displacement: i32) -> Address {
    field.add(DISPLACEMENT_WIDTH).offset(displacement as i64)
}

/// Target computed by OR-ing the raw field into an all-ones upper half
///
/// Equals [`relative_target`] for negative displacements. For non-negative
/// ones the result lands exactly 4 GiB below it, since the upper half is
/// forced to ones instead of zeros. Some builds reference their sad-face
/// descriptor this way and the known profiles depend on the exact result.
pub const fn masked_target(field: Address, displacement: i32) -> Address {
    let extended = 0xFFFF_FFFF_0000_0000u64 | displacement as u32 as u64;
    Address::new(
        field
            .get()
            .wrapping_add(extended)
            .wrapping_add(DISPLACEMENT_WIDTH),
    )
}
