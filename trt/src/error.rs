#![cfg_attr(
    not(all(target_arch = "aarch64", target_os = "linux")),
    allow(unused_imports, unused_variables)
)]

use std::{ffi::CStr, fmt, os::raw::c_int};

/// TensorRT shim error.
#[derive(Clone, Copy, Debug, thiserror::Error)]
pub struct Error(c_int);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(all(target_arch = "aarch64", target_os = "linux"))]
        {
            let status_string = unsafe { trt_sys::status_to_string(self.0) };
            let c_str = unsafe { CStr::from_ptr(status_string) };
            f.write_str(&c_str.to_string_lossy())
        }
        #[cfg(not(all(target_arch = "aarch64", target_os = "linux")))]
        Ok(())
    }
}

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
pub(crate) fn result_from(status: c_int) -> Result<(), Error> {
    if status == 0 {
        Ok(())
    } else {
        Err(Error(status))
    }
}
