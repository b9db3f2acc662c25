//! Raw FFI surface of the TensorRT C++ shim (`wrapper.cpp`).
//!
//! Only available when targeting the device; other targets compile to an
//! empty crate so that the rest of the workspace builds without TensorRT.

#![warn(unsafe_op_in_unsafe_fn)]
#![cfg(all(target_arch = "aarch64", target_os = "linux"))]

use std::os::raw::{c_char, c_float, c_int};

/// Opaque engine handle owned by the shim.
#[repr(C)]
pub struct Engine {
    _private: [u8; 0],
}

extern "C" {
    pub fn status_to_string(status: c_int) -> *const c_char;

    pub fn engine_load(path: *const c_char, engine_out: *mut *mut Engine) -> c_int;
    pub fn engine_delete(engine: *mut Engine);

    pub fn engine_input_shape(
        engine: *mut Engine,
        channels: *mut i32,
        height: *mut i32,
        width: *mut i32,
    ) -> c_int;
    pub fn engine_output_len(engine: *mut Engine, len: *mut i64) -> c_int;

    pub fn engine_execute(
        engine: *mut Engine,
        input: *const c_float,
        input_len: usize,
        output: *mut c_float,
        output_len: usize,
    ) -> c_int;
}
