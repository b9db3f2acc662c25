//! Pipeline configuration settings.

use crate::{
    camera::{CameraConfig, SourceDescriptor},
    consts::{
        DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_DEPTH_STALE_AFTER, DEFAULT_ENGINE_PATH,
        DEFAULT_JPEG_QUALITY, DEFAULT_OUTPUT_ROOT,
    },
    schedule::DepthRate,
};
use eyre::{Result, WrapErr};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Artifact output settings.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Encode the left image with overlaid detections to a JPEG per frame.
    pub save_annotated_image: bool,
    /// Write a YOLO-format label text file per frame.
    pub save_label_file: bool,
    /// JPEG quality of annotated frames.
    pub jpeg_quality: u8,
    /// Root of per-session output directories.
    pub output_root: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            save_annotated_image: false,
            save_label_file: false,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
        }
    }
}

/// Pipeline configuration settings.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    /// The stereo source to open.
    pub source: SourceDescriptor,
    /// Source configuration applied at open time.
    pub camera: CameraConfig,
    /// Path of the prebuilt detector engine.
    pub engine_path: PathBuf,
    /// Detector confidence threshold, applied at engine load time. The
    /// orchestrator performs no further filtering.
    pub confidence_threshold: f32,
    /// Depth decimation rate.
    pub depth_rate: DepthRate,
    /// Number of reuse frames after which a decimated depth map is reported
    /// stale.
    pub depth_stale_after_frames: u64,
    /// Artifact output settings.
    pub artifacts: ArtifactConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceDescriptor::default(),
            camera: CameraConfig::default(),
            engine_path: PathBuf::from(DEFAULT_ENGINE_PATH),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            depth_rate: DepthRate::default(),
            depth_stale_after_frames: DEFAULT_DEPTH_STALE_AFTER,
            artifacts: ArtifactConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from a JSON file. Missing fields take their
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .wrap_err_with(|| format!("failed to parse config from {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::DepthPreset;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.source.is_live());
        assert_eq!(config.depth_rate, DepthRate::EveryFrame);
        assert!(!config.artifacts.save_annotated_image);
        assert_eq!(config.camera.depth_range.min, 1.0);
        assert_eq!(config.camera.depth_range.max, 40.0);
    }

    #[test]
    fn test_partial_json_round_trip() {
        let config: Config = serde_json::from_str(
            r#"{
                "source": {"recording": {"path": "/data/flight.svo"}},
                "camera": {"depth_preset": "best"},
                "depth_rate": {"hz": 10.0},
                "artifacts": {"save_label_file": true}
            }"#,
        )
        .unwrap();
        assert!(!config.source.is_live());
        assert_eq!(config.camera.depth_preset, DepthPreset::Best);
        assert_eq!(config.depth_rate, DepthRate::Hz(10.0));
        assert!(config.artifacts.save_label_file);
        assert!(!config.artifacts.save_annotated_image);

        let encoded = serde_json::to_string(&config).unwrap();
        let decoded: Config = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.depth_rate, DepthRate::Hz(10.0));
    }
}
