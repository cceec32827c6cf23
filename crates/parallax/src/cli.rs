use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "parallax",
    author,
    version,
    about = "Depth parallax image viewer",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub scene: SceneArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate the scene and compile the shaders without opening a window.
    Check(SceneArgs),
}

/// Scene selection and per-run overrides of scene file values.
#[derive(Args, Debug, Clone, Default)]
pub struct SceneArgs {
    /// Scene file (TOML) naming the images and thresholds.
    #[arg(long, value_name = "FILE", env = "PARALLAX_SCENE")]
    pub config: Option<PathBuf>,

    /// Colour image URL or path.
    #[arg(long, value_name = "SRC")]
    pub original: Option<String>,

    /// Depth map URL or path.
    #[arg(long, value_name = "SRC")]
    pub depth: Option<String>,

    /// Divisor for vertical displacement; larger values move less.
    #[arg(long, value_name = "N", value_parser = parse_threshold)]
    pub vertical_threshold: Option<f32>,

    /// Divisor for horizontal displacement; larger values move less.
    #[arg(long, value_name = "N", value_parser = parse_threshold)]
    pub horizontal_threshold: Option<f32>,

    /// Replacement fragment shader (GLSL 450) honouring the viewer's uniforms.
    #[arg(long, value_name = "FILE")]
    pub fragment: Option<PathBuf>,

    /// Initial window size in logical pixels (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// Give up if the images have not loaded within this long (e.g. `20s`).
    #[arg(long, value_name = "DURATION", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Ignore any accelerometer and use pointer input only.
    #[arg(long)]
    pub no_orientation: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_threshold(value: &str) -> Result<f32, String> {
    let threshold = sceneconfig::parse_number(value)?;
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(format!("threshold must be a positive number; got '{}'", value.trim()));
    }
    Ok(threshold)
}

pub fn parse_surface_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1280x720".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| "invalid width in window size".to_string())?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| "invalid height in window size".to_string())?;

    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".to_string());
    }

    Ok((width, height))
}

pub fn parse_timeout(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_nan() || seconds <= 0.0 {
            return Err(format!("timeout must be greater than zero; got '{trimmed}'"));
        }
        return Duration::try_from_secs_f64(seconds)
            .map_err(|err| format!("invalid timeout '{trimmed}': {err}"));
    }
    match humantime::parse_duration(trimmed) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        Ok(_) => Err("timeout must be greater than zero".to_string()),
        Err(err) => Err(format!("invalid timeout '{trimmed}': {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_surface_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_surface_size(" 800 X 600 ").unwrap(), (800, 600));
        assert!(parse_surface_size("1280").is_err());
        assert!(parse_surface_size("0x720").is_err());
    }

    #[test]
    fn parses_thresholds_and_timeouts() {
        assert_eq!(parse_threshold("35").unwrap(), 35.0);
        assert!(parse_threshold("-2").is_err());
        assert!(parse_threshold("abc").is_err());

        assert_eq!(parse_timeout("20s").unwrap(), Duration::from_secs(20));
        assert_eq!(parse_timeout("1.5").unwrap(), Duration::from_millis(1500));
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("soon").is_err());
        assert!(parse_timeout("1e30").is_err());
        assert!(parse_timeout("inf").is_err());
    }

    #[test]
    fn check_subcommand_takes_scene_flags() {
        let cli = Cli::try_parse_from([
            "parallax",
            "check",
            "--original",
            "a.png",
            "--depth",
            "b.png",
            "--no-orientation",
        ])
        .unwrap();
        let Some(Command::Check(args)) = cli.command else {
            panic!("expected check subcommand");
        };
        assert_eq!(args.original.as_deref(), Some("a.png"));
        assert!(args.no_orientation);
    }
}
