//! Raw FFI surface of the ZED SDK C++ shim (`wrapper.cpp`).
//!
//! Only available when targeting the device; other targets compile to an
//! empty crate so that the rest of the workspace builds without the SDK.

#![warn(unsafe_op_in_unsafe_fn)]
#![cfg(all(target_arch = "aarch64", target_os = "linux"))]

use std::os::raw::{c_char, c_float, c_int};

/// Opaque camera handle owned by the shim.
#[repr(C)]
pub struct Camera {
    _private: [u8; 0],
}

/// Parameters for [`camera_open`]. Mirrors `OpenParams` in `wrapper.hpp`.
#[repr(C)]
pub struct OpenParams {
    pub camera_id: i32,
    pub svo_path: *const c_char,
    pub resolution: i32,
    pub fps: i32,
    pub depth_mode: i32,
    pub depth_min: c_float,
    pub depth_max: c_float,
}

extern "C" {
    pub fn is_camera_status_success(status: c_int) -> bool;
    pub fn is_camera_status_end_of_svo(status: c_int) -> bool;
    pub fn camera_status_to_string(status: c_int) -> *mut c_char;
    pub fn delete_string(string: *mut c_char);

    pub fn camera_open(params: *const OpenParams, camera_out: *mut *mut Camera) -> c_int;
    pub fn camera_delete(camera: *mut Camera);

    pub fn camera_grab(camera: *mut Camera) -> c_int;
    pub fn camera_image_size(camera: *mut Camera, width: *mut i32, height: *mut i32) -> c_int;
    pub fn camera_retrieve_left_rgb(camera: *mut Camera, rgb_out: *mut u8) -> c_int;
    pub fn camera_retrieve_depth(
        camera: *mut Camera,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        depth_out: *mut c_float,
    ) -> c_int;

    pub fn camera_fps(camera: *mut Camera) -> c_float;

    pub fn svo_frame_count(camera: *mut Camera) -> i64;
    pub fn svo_position(camera: *mut Camera) -> i64;
    pub fn svo_set_position(camera: *mut Camera, position: i64) -> c_int;
}
