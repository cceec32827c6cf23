use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use imagery::ImageFetcher;
use sceneconfig::{DEFAULT_HORIZONTAL_THRESHOLD, DEFAULT_VERTICAL_THRESHOLD};

use crate::input::DEFAULT_SMOOTHING;

/// Pointer displacement divisors, one per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub horizontal: f32,
    pub vertical: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            horizontal: DEFAULT_HORIZONTAL_THRESHOLD,
            vertical: DEFAULT_VERTICAL_THRESHOLD,
        }
    }
}

/// Runtime parameters required to open the viewer.
///
/// `RendererConfig` mirrors the resolved scene and CLI flags: which images to
/// load and how, the shader to compile, and how input is shaped.
#[derive(Clone)]
pub struct RendererConfig {
    /// Window title.
    pub title: String,
    /// Initial window size in logical pixels.
    pub surface_size: (u32, u32),
    /// Colour image then depth image, in that order.
    pub images: Vec<imagery::ImageSource>,
    /// Fetcher used by the loader threads.
    pub fetcher: Arc<dyn ImageFetcher>,
    /// How long to wait for every image before giving up.
    pub load_timeout: Duration,
    pub thresholds: Thresholds,
    /// Replacement fragment shader source, if any.
    pub fragment_source: Option<String>,
    pub smoothing: f32,
    pub max_tilt: f32,
    /// IIO root to probe for an accelerometer; `None` disables tilt input.
    pub orientation_root: Option<PathBuf>,
}

impl RendererConfig {
    /// Builds a configuration with default input shaping for two sources.
    pub fn new(images: Vec<imagery::ImageSource>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            title: "Parallax".to_string(),
            surface_size: (1280, 720),
            images,
            fetcher,
            load_timeout: sceneconfig::DEFAULT_LOAD_TIMEOUT,
            thresholds: Thresholds::default(),
            fragment_source: None,
            smoothing: DEFAULT_SMOOTHING,
            max_tilt: sceneconfig::DEFAULT_MAX_TILT,
            orientation_root: Some(PathBuf::from(crate::orientation::DEFAULT_SENSOR_ROOT)),
        }
    }
}
