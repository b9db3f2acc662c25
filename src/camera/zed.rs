//! ZED-backed stereo source.

use super::{
    CameraConfig, DepthPreset, GrabOutcome, OpenError, Rect, Resolution, RetrieveError, SeekError,
    SourceDescriptor, StereoCamera,
};
use crate::consts::DEPTH_WARMUP_GRABS;
use ndarray::{Array2, Array3};

/// Consecutive grab failures after which the source is declared unusable.
const MAX_CONSECUTIVE_GRAB_FAILURES: u32 = 10;

// sl::RESOLUTION values.
const SDK_RESOLUTION_HD1080: i32 = 1;
const SDK_RESOLUTION_HD720: i32 = 2;
const SDK_RESOLUTION_VGA: i32 = 3;

// sl::DEPTH_MODE values.
const SDK_DEPTH_PERFORMANCE: i32 = 1;
const SDK_DEPTH_QUALITY: i32 = 2;
const SDK_DEPTH_ULTRA: i32 = 3;

/// A live or recorded ZED source.
///
/// The handle is confined to the thread that opened it; the pipeline opens
/// the camera on the orchestrator thread.
pub struct ZedCamera {
    camera: talon_zed::Camera,
    live: bool,
    width: u32,
    height: u32,
    current: Option<u64>,
    pending_seek: Option<u64>,
    consecutive_failures: u32,
}

impl ZedCamera {
    /// Opens the source described by `source` with the given configuration.
    ///
    /// # Errors
    ///
    /// See [`OpenError`] for the failure taxonomy.
    pub fn open(source: &SourceDescriptor, config: &CameraConfig) -> Result<Self, OpenError> {
        let (camera_id, svo_path) = match source {
            SourceDescriptor::Live { device_id } => (device_id.unwrap_or(0), None),
            SourceDescriptor::Recording { path } => (0, Some(path.clone())),
        };
        let params = talon_zed::OpenParams {
            camera_id: camera_id.try_into().map_err(|_| {
                OpenError::ConfigurationRejected(format!("device id {camera_id} out of range"))
            })?,
            svo_path,
            resolution: match config.resolution {
                Resolution::Hd1080 => SDK_RESOLUTION_HD1080,
                Resolution::Hd720 => SDK_RESOLUTION_HD720,
                Resolution::Vga => SDK_RESOLUTION_VGA,
            },
            #[allow(clippy::cast_possible_truncation)]
            fps: config.fps.unwrap_or(0.0) as i32,
            depth_mode: match config.depth_preset {
                DepthPreset::Fast => SDK_DEPTH_PERFORMANCE,
                DepthPreset::Balanced => SDK_DEPTH_QUALITY,
                DepthPreset::Best => SDK_DEPTH_ULTRA,
            },
            depth_min: config.depth_range.min,
            depth_max: config.depth_range.max,
        };
        let live = source.is_live();
        let camera = talon_zed::Camera::open(&params).map_err(|err| match err {
            talon_zed::OpenError::NotFound => {
                OpenError::CameraUnavailable("no stereo camera detected".into())
            }
            talon_zed::OpenError::InvalidPath => {
                OpenError::InvalidSession("session path is not a valid C string".into())
            }
            talon_zed::OpenError::Generic(error) if live => {
                OpenError::CameraUnavailable(error.to_string())
            }
            talon_zed::OpenError::Generic(error) => OpenError::InvalidSession(error.to_string()),
        })?;
        let (width, height) = camera
            .image_size()
            .map_err(|err| OpenError::ConfigurationRejected(err.to_string()))?;
        Ok(Self {
            camera,
            live,
            width,
            height,
            current: None,
            pending_seek: None,
            consecutive_failures: 0,
        })
    }

    fn advance_cursor(&mut self) {
        self.current =
            Some(self.pending_seek.take().unwrap_or_else(|| self.current.map_or(0, |i| i + 1)));
    }
}

impl StereoCamera for ZedCamera {
    fn grab(&mut self) -> GrabOutcome {
        match self.camera.grab() {
            Ok(()) => {
                self.consecutive_failures = 0;
                self.advance_cursor();
                GrabOutcome::Frame
            }
            Err(err) if err.is_end_of_svo() => GrabOutcome::EndOfSession,
            Err(err) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= MAX_CONSECUTIVE_GRAB_FAILURES {
                    GrabOutcome::Fatal(err.to_string())
                } else {
                    self.advance_cursor();
                    GrabOutcome::Transient(err.to_string())
                }
            }
        }
    }

    fn retrieve_left(&mut self) -> Result<Array3<u8>, RetrieveError> {
        let mut buf = vec![0; self.width as usize * self.height as usize * 3];
        self.camera
            .retrieve_left_rgb(&mut buf)
            .map_err(|err| RetrieveError(err.to_string()))?;
        Array3::from_shape_vec((self.height as usize, self.width as usize, 3), buf)
            .map_err(|err| RetrieveError(err.to_string()))
    }

    fn retrieve_depth(&mut self, roi: Option<Rect>) -> Result<Array2<f32>, RetrieveError> {
        let roi = roi.unwrap_or(Rect { x: 0, y: 0, width: self.width, height: self.height });
        let mut buf = vec![0.0; roi.width as usize * roi.height as usize];
        self.camera
            .retrieve_depth(roi.x, roi.y, roi.width, roi.height, &mut buf)
            .map_err(|err| RetrieveError(err.to_string()))?;
        Array2::from_shape_vec((roi.height as usize, roi.width as usize), buf)
            .map_err(|err| RetrieveError(err.to_string()))
    }

    fn seek(&mut self, target: u64) -> Result<(), SeekError> {
        if self.live {
            return Err(SeekError::Unsupported);
        }
        let frames_total = self.frames_total().unwrap_or(0);
        if target >= frames_total {
            return Err(SeekError::OutOfRange { target, frames_total });
        }
        #[allow(clippy::cast_possible_wrap)]
        self.camera
            .svo_set_position(target as i64)
            .map_err(|_| SeekError::OutOfRange { target, frames_total })?;
        self.pending_seek = Some(target);
        Ok(())
    }

    fn current_index(&self) -> Option<u64> {
        self.current
    }

    fn frames_total(&self) -> Option<u64> {
        if self.live {
            None
        } else {
            u64::try_from(self.camera.svo_frame_count()).ok()
        }
    }

    fn native_fps(&self) -> Option<f32> {
        let fps = self.camera.fps();
        (fps > 0.0).then_some(fps)
    }

    fn warm_up(&mut self) -> Result<(), RetrieveError> {
        // The depth backend needs a couple of grabs before it produces a
        // usable map. The warm-up frames are discarded and the cursor is
        // restored so that the session still starts at frame zero.
        for _ in 0..DEPTH_WARMUP_GRABS {
            if let Err(err) = self.camera.grab() {
                if err.is_end_of_svo() {
                    break;
                }
                return Err(RetrieveError(err.to_string()));
            }
        }
        if !self.live {
            self.camera
                .svo_set_position(0)
                .map_err(|err| RetrieveError(err.to_string()))?;
        }
        self.current = None;
        self.pending_seek = None;
        Ok(())
    }
}
