#![cfg_attr(not(all(target_arch = "aarch64", target_os = "linux")), allow(unused_imports))]

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
use crate::error::result_from;
use crate::error::Error;
#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
use std::{ffi::CString, path::Path, ptr};

/// Error returned from [`Engine::load`].
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The engine path contains an interior null byte.
    #[error("invalid engine path")]
    InvalidPath,
    /// Generic error code.
    #[error("{0}")]
    Generic(Error),
}

/// A deserialized inference engine with a single input and a single output
/// binding.
///
/// The handle is not thread-safe; it must be used from the thread that
/// loaded it.
#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
pub struct Engine {
    engine_ptr: *mut trt_sys::Engine,
}

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
impl Engine {
    /// Deserializes a prebuilt engine file.
    ///
    /// # Errors
    ///
    /// See [`LoadError`] for all possible errors.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let path = CString::new(path.as_os_str().as_encoded_bytes())
            .map_err(|_| LoadError::InvalidPath)?;
        let mut engine_ptr = ptr::null_mut();
        if let Err(error) =
            result_from(unsafe { trt_sys::engine_load(path.as_ptr(), &mut engine_ptr) })
        {
            if !engine_ptr.is_null() {
                unsafe { trt_sys::engine_delete(engine_ptr) };
            }
            return Err(LoadError::Generic(error));
        }
        Ok(Self { engine_ptr })
    }

    /// Returns the input binding dimensions as `(channels, height, width)`.
    ///
    /// # Errors
    ///
    /// This method can result in a generic [`Error`].
    #[allow(clippy::cast_sign_loss)]
    pub fn input_shape(&self) -> Result<(u32, u32, u32), Error> {
        let (mut channels, mut height, mut width) = (0, 0, 0);
        result_from(unsafe {
            trt_sys::engine_input_shape(self.engine_ptr, &mut channels, &mut height, &mut width)
        })?;
        Ok((channels as u32, height as u32, width as u32))
    }

    /// Returns the flat element count of the output binding.
    ///
    /// # Errors
    ///
    /// This method can result in a generic [`Error`].
    #[allow(clippy::cast_sign_loss)]
    pub fn output_len(&self) -> Result<usize, Error> {
        let mut len = 0;
        result_from(unsafe { trt_sys::engine_output_len(self.engine_ptr, &mut len) })?;
        Ok(len as usize)
    }

    /// Runs synchronous inference.
    ///
    /// # Errors
    ///
    /// This method can result in a generic [`Error`], including when the
    /// buffer lengths do not match the engine bindings.
    pub fn execute(&mut self, input: &[f32], output: &mut [f32]) -> Result<(), Error> {
        result_from(unsafe {
            trt_sys::engine_execute(
                self.engine_ptr,
                input.as_ptr(),
                input.len(),
                output.as_mut_ptr(),
                output.len(),
            )
        })
    }
}

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
impl Drop for Engine {
    fn drop(&mut self) {
        unsafe { trt_sys::engine_delete(self.engine_ptr) };
    }
}
