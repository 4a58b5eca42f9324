//! Load address of the running kernel (Windows only).

use std::ffi::c_void;
use std::ptr;

use tracing::debug;
use windows::Win32::System::ProcessStatus::EnumDeviceDrivers;

use crate::error::{Error, Result};
use crate::memory::Address;

/// Base address of the first loaded driver, which is always the kernel image
pub fn running_kernel_base() -> Result<Address> {
    let mut needed = 0u32;
    unsafe { EnumDeviceDrivers(ptr::null_mut(), 0, &mut needed) }
        .map_err(|e| Error::Image(format!("EnumDeviceDrivers failed: {}", e)))?;

    let count = needed as usize / size_of::<*mut c_void>();
    if count == 0 {
        return Err(Error::Image("no loaded drivers reported".to_string()));
    }

    let mut bases: Vec<*mut c_void> = vec![ptr::null_mut(); count];
    unsafe { EnumDeviceDrivers(bases.as_mut_ptr(), needed, &mut needed) }
        .map_err(|e| Error::Image(format!("EnumDeviceDrivers failed: {}", e)))?;

    let base = Address::new(bases[0] as u64);
    if base.is_null() {
        return Err(Error::Image(
            "kernel base is hidden (requires an elevated process)".to_string(),
        ));
    }

    debug!("Running kernel base: {}", base);
    Ok(base)
}
