//! Scene description for the parallax viewer.
//!
//! A scene names the colour image, its depth map, and the displacement
//! thresholds fed to the fragment shader. Scenes are written in TOML:
//!
//! ```toml
//! image_original = "https://example.com/portrait.jpg"
//! image_depth = "portrait-depth.png"
//! vertical_threshold = 15
//! horizontal_threshold = "35"
//!
//! [loading]
//! timeout = "20s"
//!
//! [input]
//! smoothing = 0.05
//! orientation = true
//! ```
//!
//! Thresholds accept numbers or numeric strings so values lifted from HTML
//! `data-*` attributes can be pasted unchanged.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const DEFAULT_VERTICAL_THRESHOLD: f32 = 15.0;
pub const DEFAULT_HORIZONTAL_THRESHOLD: f32 = 35.0;
pub const DEFAULT_SMOOTHING: f32 = 0.05;
pub const DEFAULT_MAX_TILT: f32 = 25.0;
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read configuration at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("missing required setting '{0}'")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SceneConfig {
    #[serde(default)]
    pub image_original: Option<String>,
    #[serde(default)]
    pub image_depth: Option<String>,
    #[serde(default, deserialize_with = "deserialize_number_opt")]
    pub vertical_threshold: Option<f32>,
    #[serde(default, deserialize_with = "deserialize_number_opt")]
    pub horizontal_threshold: Option<f32>,
    /// Replacement fragment shader; must honour the viewer's uniform interface.
    #[serde(default)]
    pub fragment_shader: Option<PathBuf>,
    #[serde(default)]
    pub loading: LoadingConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub window: WindowConfig,
    /// Directory relative sources resolve against; set by [`SceneConfig::load`].
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoadingConfig {
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    pub timeout: Option<Duration>,
    /// Origin the scene is served from. Remote images on any other origin
    /// are fetched anonymously.
    #[serde(default)]
    pub page_origin: Option<String>,
    /// Extra request headers sent with same-origin fetches only.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_max_tilt")]
    pub max_tilt: f32,
    #[serde(default = "default_orientation")]
    pub orientation: bool,
    #[serde(default)]
    pub sensor_root: Option<PathBuf>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            smoothing: DEFAULT_SMOOTHING,
            max_tilt: DEFAULT_MAX_TILT,
            orientation: true,
            sensor_root: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            width: None,
            height: None,
        }
    }
}

/// Scene settings after validation, with defaults filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedScene {
    pub image_original: String,
    pub image_depth: String,
    pub vertical_threshold: f32,
    pub horizontal_threshold: f32,
    pub fragment_shader: Option<PathBuf>,
    pub load_timeout: Duration,
    pub page_origin: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub smoothing: f32,
    pub max_tilt: f32,
    pub orientation: bool,
    pub sensor_root: Option<PathBuf>,
    pub title: String,
    pub window_size: Option<(u32, u32)>,
    pub base_dir: Option<PathBuf>,
}

fn default_smoothing() -> f32 {
    DEFAULT_SMOOTHING
}

fn default_max_tilt() -> f32 {
    DEFAULT_MAX_TILT
}

fn default_orientation() -> bool {
    true
}

fn default_title() -> String {
    "Parallax".to_string()
}

fn deserialize_number_opt<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Float(f64),
        Int(i64),
        Str(String),
    }

    let helper: Option<Helper> = Option::deserialize(deserializer)?;
    let value = match helper {
        None => None,
        Some(Helper::Float(value)) => Some(value as f32),
        Some(Helper::Int(value)) => Some(value as f32),
        Some(Helper::Str(raw)) => Some(parse_number(&raw).map_err(de::Error::custom)?),
    };
    Ok(value)
}

/// Parses a numeric setting that may have arrived as a string.
pub fn parse_number(raw: &str) -> Result<f32, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("numeric value must not be empty".into());
    }
    trimmed
        .parse::<f32>()
        .map_err(|_| format!("'{trimmed}' is not a number"))
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Duration::try_from_secs_f64(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration {v}: {err}")))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl SceneConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SceneConfig = toml::from_str(input)?;
        Ok(raw)
    }

    /// Reads a scene file and remembers its directory for relative sources.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Checks invariants and fills in defaults.
    ///
    /// Both image sources are required; everything else has a default.
    pub fn resolve(&self) -> Result<ResolvedScene, ConfigError> {
        let image_original = required_source(&self.image_original, "image_original")?;
        let image_depth = required_source(&self.image_depth, "image_depth")?;

        let vertical_threshold = self
            .vertical_threshold
            .unwrap_or(DEFAULT_VERTICAL_THRESHOLD);
        let horizontal_threshold = self
            .horizontal_threshold
            .unwrap_or(DEFAULT_HORIZONTAL_THRESHOLD);
        validate_threshold("vertical_threshold", vertical_threshold)?;
        validate_threshold("horizontal_threshold", horizontal_threshold)?;

        let smoothing = self.input.smoothing;
        if !smoothing.is_finite() || smoothing <= 0.0 || smoothing > 1.0 {
            return Err(ConfigError::Invalid(format!(
                "input.smoothing must be in (0, 1]; got {smoothing}"
            )));
        }

        let max_tilt = self.input.max_tilt;
        if !max_tilt.is_finite() || max_tilt <= 0.0 || max_tilt > 90.0 {
            return Err(ConfigError::Invalid(format!(
                "input.max_tilt must be in (0, 90] degrees; got {max_tilt}"
            )));
        }

        let load_timeout = self.loading.timeout.unwrap_or(DEFAULT_LOAD_TIMEOUT);
        if load_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "loading.timeout must be greater than zero".into(),
            ));
        }

        if let Some(origin) = &self.loading.page_origin {
            if !(origin.starts_with("http://") || origin.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "loading.page_origin '{origin}' must be an http(s) URL"
                )));
            }
        }

        let window_size = match (self.window.width, self.window.height) {
            (Some(width), Some(height)) if width > 0 && height > 0 => Some((width, height)),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid(
                    "window.width and window.height must be set together and be non-zero".into(),
                ))
            }
        };

        let fragment_shader = self.fragment_shader.as_ref().map(|path| {
            match (&self.base_dir, path.is_relative()) {
                (Some(base), true) => base.join(path),
                _ => path.clone(),
            }
        });

        let sensor_root = self.input.sensor_root.clone();

        Ok(ResolvedScene {
            image_original,
            image_depth,
            vertical_threshold,
            horizontal_threshold,
            fragment_shader,
            load_timeout,
            page_origin: self.loading.page_origin.clone(),
            headers: self.loading.headers.clone(),
            smoothing,
            max_tilt,
            orientation: self.input.orientation,
            sensor_root,
            title: self.window.title.clone(),
            window_size,
            base_dir: self.base_dir.clone(),
        })
    }
}

fn required_source(value: &Option<String>, key: &'static str) -> Result<String, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(source) if !source.is_empty() => Ok(source.to_string()),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn validate_threshold(key: &str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{key} must be a positive number; got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
image_original = "https://example.com/portrait.jpg"
image_depth = "portrait-depth.png"
vertical_threshold = 15
horizontal_threshold = "35.5"
fragment_shader = "shaders/custom.frag"

[loading]
timeout = "12s"
page_origin = "https://example.com"

[loading.headers]
Authorization = "Bearer abc"

[input]
smoothing = 0.1
orientation = false

[window]
title = "Portrait"
width = 1280
height = 720
"#;

    #[test]
    fn parses_sample_scene() {
        let mut config = SceneConfig::from_toml_str(SAMPLE).expect("parse scene");
        config.base_dir = Some(PathBuf::from("/srv/scenes"));
        let scene = config.resolve().expect("resolve scene");
        assert_eq!(scene.image_original, "https://example.com/portrait.jpg");
        assert_eq!(scene.image_depth, "portrait-depth.png");
        assert_eq!(scene.vertical_threshold, 15.0);
        assert_eq!(scene.horizontal_threshold, 35.5);
        assert_eq!(scene.load_timeout, Duration::from_secs(12));
        assert_eq!(
            scene.fragment_shader,
            Some(PathBuf::from("/srv/scenes/shaders/custom.frag"))
        );
        assert_eq!(
            scene.headers.get("Authorization").map(String::as_str),
            Some("Bearer abc")
        );
        assert!((scene.smoothing - 0.1).abs() < f32::EPSILON);
        assert!(!scene.orientation);
        assert_eq!(scene.window_size, Some((1280, 720)));
        assert_eq!(scene.title, "Portrait");
    }

    #[test]
    fn fills_defaults() {
        let config = SceneConfig::from_toml_str(
            r#"
image_original = "a.png"
image_depth = "b.png"
"#,
        )
        .unwrap();
        let scene = config.resolve().unwrap();
        assert_eq!(scene.vertical_threshold, DEFAULT_VERTICAL_THRESHOLD);
        assert_eq!(scene.horizontal_threshold, DEFAULT_HORIZONTAL_THRESHOLD);
        assert_eq!(scene.load_timeout, DEFAULT_LOAD_TIMEOUT);
        assert_eq!(scene.smoothing, DEFAULT_SMOOTHING);
        assert_eq!(scene.max_tilt, DEFAULT_MAX_TILT);
        assert!(scene.orientation);
        assert_eq!(scene.window_size, None);
    }

    #[test]
    fn rejects_missing_depth_source() {
        let config = SceneConfig::from_toml_str(r#"image_original = "a.png""#).unwrap();
        let err = config.resolve().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("image_depth")));
    }

    #[test]
    fn rejects_blank_original_source() {
        let config = SceneConfig::from_toml_str(
            r#"
image_original = "   "
image_depth = "b.png"
"#,
        )
        .unwrap();
        let err = config.resolve().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("image_original")));
    }

    #[test]
    fn rejects_non_numeric_threshold() {
        let err = SceneConfig::from_toml_str(
            r#"
image_original = "a.png"
image_depth = "b.png"
vertical_threshold = "steep"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_zero_threshold() {
        let config = SceneConfig::from_toml_str(
            r#"
image_original = "a.png"
image_depth = "b.png"
horizontal_threshold = 0
"#,
        )
        .unwrap();
        assert!(matches!(config.resolve(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_half_specified_window() {
        let config = SceneConfig::from_toml_str(
            r#"
image_original = "a.png"
image_depth = "b.png"

[window]
width = 800
"#,
        )
        .unwrap();
        assert!(matches!(config.resolve(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_records_base_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.toml");
        fs::write(&path, "image_original = \"a.png\"\nimage_depth = \"b.png\"\n").unwrap();
        let config = SceneConfig::load(&path).unwrap();
        assert_eq!(config.base_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = SceneConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn rejects_out_of_range_timeout() {
        for value in ["1e30", "inf"] {
            let scene = format!(
                "image_original = \"a.png\"\nimage_depth = \"b.png\"\n[loading]\ntimeout = {value}\n"
            );
            let err = SceneConfig::from_toml_str(&scene).unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)), "{value}: {err}");
        }
    }
}
