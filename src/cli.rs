//! Command Line Interface.

use crate::{camera::DepthPreset, schedule::DepthRate};
use clap::StructOpt;
use std::path::PathBuf;

/// The real-time stereo-vision inference pipeline of the talon tracking
/// sensor
#[derive(StructOpt, Debug)]
#[clap(about, version = env!("GIT_VERSION"))]
pub struct Cli {
    /// Load config from file.
    #[structopt(short = 'c', long)]
    pub config: Option<PathBuf>,
    /// Process a recorded session file instead of the live sensor.
    #[structopt(short = 'r', long)]
    pub recording: Option<PathBuf>,
    /// Path of the prebuilt detector engine.
    #[structopt(short = 'e', long)]
    pub engine: Option<PathBuf>,
    /// Depth map frequency in Hz; overrides the configured rate.
    #[structopt(short = 'd', long)]
    pub depth_hz: Option<f32>,
    /// Compute a depth map on every frame; overrides `--depth-hz`.
    #[structopt(long)]
    pub depth_every_frame: bool,
    /// Depth backend quality preset.
    #[structopt(long, arg_enum)]
    pub depth_preset: Option<DepthPresetArg>,
    /// Save annotated JPEG frames.
    #[structopt(short = 'j', long)]
    pub save_images: bool,
    /// Save YOLO-format label files.
    #[structopt(short = 'l', long)]
    pub save_labels: bool,
    /// Root of per-session output directories.
    #[structopt(short = 'o', long)]
    pub output_root: Option<PathBuf>,
    /// Start processing immediately instead of waiting for a key.
    #[structopt(short = 's', long)]
    pub autostart: bool,
}

/// CLI spelling of [`DepthPreset`].
#[derive(clap::ArgEnum, Clone, Copy, Debug)]
pub enum DepthPresetArg {
    /// Lowest latency, noisiest maps.
    Fast,
    /// The default trade-off.
    Balanced,
    /// Highest quality, slowest.
    Best,
}

impl From<DepthPresetArg> for DepthPreset {
    fn from(arg: DepthPresetArg) -> Self {
        match arg {
            DepthPresetArg::Fast => Self::Fast,
            DepthPresetArg::Balanced => Self::Balanced,
            DepthPresetArg::Best => Self::Best,
        }
    }
}

impl Cli {
    /// Folds the CLI overrides into a configuration.
    pub fn apply(&self, config: &mut crate::config::Config) {
        if let Some(path) = &self.recording {
            config.source = crate::camera::SourceDescriptor::Recording { path: path.clone() };
        }
        if let Some(path) = &self.engine {
            config.engine_path = path.clone();
        }
        if let Some(hz) = self.depth_hz {
            config.depth_rate = DepthRate::Hz(hz);
        }
        if self.depth_every_frame {
            config.depth_rate = DepthRate::EveryFrame;
        }
        if let Some(preset) = self.depth_preset {
            config.camera.depth_preset = preset.into();
        }
        if self.save_images {
            config.artifacts.save_annotated_image = true;
        }
        if self.save_labels {
            config.artifacts.save_label_file = true;
        }
        if let Some(root) = &self.output_root {
            config.artifacts.output_root = root.clone();
        }
    }
}
