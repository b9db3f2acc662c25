#![cfg_attr(not(all(target_arch = "aarch64", target_os = "linux")), allow(unused_imports))]

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
use crate::error::result_from;
use crate::error::Error;
#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
use std::{ffi::CString, ptr};
use std::{os::raw::c_float, path::PathBuf};

/// Parameters for [`Camera::open`].
///
/// `resolution` and `depth_mode` carry the SDK's numeric enumeration values;
/// the pipeline's camera adapter owns the mapping from its stable presets.
#[derive(Clone, Debug)]
pub struct OpenParams {
    /// Camera index for live sources; ignored when `svo_path` is set.
    pub camera_id: i32,
    /// Path to a recorded SVO session, or `None` for a live source.
    pub svo_path: Option<PathBuf>,
    /// SDK resolution enumeration value.
    pub resolution: i32,
    /// Requested capture frame rate; `0` lets the SDK pick.
    pub fps: i32,
    /// SDK depth mode enumeration value.
    pub depth_mode: i32,
    /// Lower depth clipping bound in meters.
    pub depth_min: c_float,
    /// Upper depth clipping bound in meters.
    pub depth_max: c_float,
}

/// Error returned from [`Camera::open`].
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// No camera detected on the expected interface.
    #[error("stereo camera not found")]
    NotFound,
    /// The SVO path contains an interior null byte.
    #[error("invalid session path")]
    InvalidPath,
    /// Generic error code.
    #[error("{0}")]
    Generic(Error),
}

/// ZED SDK camera interface.
///
/// The handle is not thread-safe; it must be used from the thread that
/// opened it.
#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
pub struct Camera {
    camera_ptr: *mut zed_sys::Camera,
}

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
impl Camera {
    /// Opens a live camera or a recorded SVO session.
    ///
    /// # Errors
    ///
    /// See [`OpenError`] for all possible errors.
    pub fn open(params: &OpenParams) -> Result<Self, OpenError> {
        let svo_path = params
            .svo_path
            .as_ref()
            .map(|path| CString::new(path.as_os_str().as_encoded_bytes()))
            .transpose()
            .map_err(|_| OpenError::InvalidPath)?;
        let raw = zed_sys::OpenParams {
            camera_id: params.camera_id,
            svo_path: svo_path.as_ref().map_or(ptr::null(), |path| path.as_ptr()),
            resolution: params.resolution,
            fps: params.fps,
            depth_mode: params.depth_mode,
            depth_min: params.depth_min,
            depth_max: params.depth_max,
        };
        let mut camera_ptr = ptr::null_mut();
        if let Err(error) = result_from(unsafe { zed_sys::camera_open(&raw, &mut camera_ptr) }) {
            if !camera_ptr.is_null() {
                unsafe { zed_sys::camera_delete(camera_ptr) };
            }
            return Err(OpenError::Generic(error));
        }
        if camera_ptr.is_null() {
            return Err(OpenError::NotFound);
        }
        Ok(Self { camera_ptr })
    }

    /// Blocks until the next frame is captured or the session ends.
    ///
    /// # Errors
    ///
    /// This method can result in a generic [`Error`]. The end of a recorded
    /// session is reported as an error for which [`Error::is_end_of_svo`]
    /// returns `true`.
    pub fn grab(&mut self) -> Result<(), Error> {
        result_from(unsafe { zed_sys::camera_grab(self.camera_ptr) })
    }

    /// Returns the rectified image size as `(width, height)`.
    ///
    /// # Errors
    ///
    /// This method can result in a generic [`Error`].
    #[allow(clippy::cast_sign_loss)]
    pub fn image_size(&self) -> Result<(u32, u32), Error> {
        let (mut width, mut height) = (0, 0);
        result_from(unsafe {
            zed_sys::camera_image_size(self.camera_ptr, &mut width, &mut height)
        })?;
        Ok((width as u32, height as u32))
    }

    /// Copies the left rectified view of the most recently grabbed frame as
    /// packed 8-bit RGB.
    ///
    /// # Errors
    ///
    /// This method can result in a generic [`Error`].
    ///
    /// # Panics
    ///
    /// If `rgb_out` is smaller than `width * height * 3`.
    pub fn retrieve_left_rgb(&mut self, rgb_out: &mut [u8]) -> Result<(), Error> {
        let (width, height) = self.image_size()?;
        assert!(rgb_out.len() >= width as usize * height as usize * 3);
        result_from(unsafe {
            zed_sys::camera_retrieve_left_rgb(self.camera_ptr, rgb_out.as_mut_ptr())
        })
    }

    /// Copies the depth measure in meters for a sub-rectangle of the most
    /// recently grabbed frame.
    ///
    /// # Errors
    ///
    /// This method can result in a generic [`Error`].
    ///
    /// # Panics
    ///
    /// If `depth_out` is smaller than `width * height`.
    #[allow(clippy::cast_possible_wrap)]
    pub fn retrieve_depth(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        depth_out: &mut [f32],
    ) -> Result<(), Error> {
        assert!(depth_out.len() >= width as usize * height as usize);
        result_from(unsafe {
            zed_sys::camera_retrieve_depth(
                self.camera_ptr,
                x as i32,
                y as i32,
                width as i32,
                height as i32,
                depth_out.as_mut_ptr(),
            )
        })
    }

    /// Returns the capture frame rate reported by the SDK.
    #[must_use]
    pub fn fps(&self) -> f32 {
        unsafe { zed_sys::camera_fps(self.camera_ptr) }
    }

    /// Returns the number of frames in the recorded session, or a negative
    /// value for live sources.
    #[must_use]
    pub fn svo_frame_count(&self) -> i64 {
        unsafe { zed_sys::svo_frame_count(self.camera_ptr) }
    }

    /// Returns the index of the next frame [`Camera::grab`] will deliver.
    #[must_use]
    pub fn svo_position(&self) -> i64 {
        unsafe { zed_sys::svo_position(self.camera_ptr) }
    }

    /// Positions the recorded session so that the next [`Camera::grab`]
    /// delivers the frame at `position`.
    ///
    /// # Errors
    ///
    /// This method can result in a generic [`Error`].
    pub fn svo_set_position(&mut self, position: i64) -> Result<(), Error> {
        result_from(unsafe { zed_sys::svo_set_position(self.camera_ptr, position) })
    }
}

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
impl Drop for Camera {
    fn drop(&mut self) {
        unsafe { zed_sys::camera_delete(self.camera_ptr) };
    }
}
