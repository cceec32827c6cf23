use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use imagery::{ImageSource, SourceFetcher};
use renderer::orientation::DEFAULT_SENSOR_ROOT;
use renderer::{Renderer, RendererConfig, ShaderProgram, Thresholds};
use sceneconfig::{ResolvedScene, SceneConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::SceneArgs;

const DEFAULT_WINDOW_SIZE: (u32, u32) = (1280, 720);

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Opens the viewer and blocks until it exits.
pub fn run(args: SceneArgs) -> Result<()> {
    let scene = load_scene(&args)?;
    let config = renderer_config(&scene)?;
    tracing::info!(
        original = %config.images[0],
        depth = %config.images[1],
        horizontal = config.thresholds.horizontal,
        vertical = config.thresholds.vertical,
        "starting parallax viewer"
    );
    Renderer::new(config).run()
}

/// Validates the scene and compiles the shaders, then prints the uniform
/// layout. Nothing is fetched and no window is opened.
pub fn check(args: SceneArgs) -> Result<()> {
    let scene = load_scene(&args)?;
    let config = renderer_config(&scene)?;
    let program = match config.fragment_source.as_deref() {
        Some(fragment) => ShaderProgram::with_fragment(fragment),
        None => ShaderProgram::builtin(),
    }
    .context("failed to compile shader program")?;

    println!("Scene OK");
    println!("  original:   {}", config.images[0]);
    println!("  depth:      {}", config.images[1]);
    println!(
        "  thresholds: horizontal={} vertical={}",
        config.thresholds.horizontal, config.thresholds.vertical
    );
    println!("  timeout:    {}", humantime::format_duration(config.load_timeout));
    println!(
        "  shader:     {}",
        scene
            .fragment_shader
            .as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "built-in".to_string())
    );
    let layout = program.layout();
    println!("Uniform block ({} bytes):", layout.size());
    for (name, slot) in layout.members() {
        println!(
            "  {name:<12} offset={:<3} components={}",
            slot.offset, slot.components
        );
    }
    Ok(())
}

/// Reads the scene file (if any), applies CLI overrides and validates.
pub fn load_scene(args: &SceneArgs) -> Result<ResolvedScene> {
    let mut config = match &args.config {
        Some(path) => SceneConfig::load(path)
            .with_context(|| format!("failed to load scene {}", path.display()))?,
        None => SceneConfig::default(),
    };

    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    if let Some(original) = &args.original {
        config.image_original = Some(source_from_cli(original, &cwd));
    }
    if let Some(depth) = &args.depth {
        config.image_depth = Some(source_from_cli(depth, &cwd));
    }
    if let Some(threshold) = args.vertical_threshold {
        config.vertical_threshold = Some(threshold);
    }
    if let Some(threshold) = args.horizontal_threshold {
        config.horizontal_threshold = Some(threshold);
    }
    if let Some(fragment) = &args.fragment {
        config.fragment_shader = Some(cwd.join(fragment));
    }
    if let Some((width, height)) = args.size {
        config.window.width = Some(width);
        config.window.height = Some(height);
    }
    if let Some(timeout) = args.timeout {
        config.loading.timeout = Some(timeout);
    }
    if args.no_orientation {
        config.input.orientation = false;
    }

    let scene = config.resolve().context("invalid scene")?;
    tracing::debug!(?scene, "resolved scene");
    Ok(scene)
}

/// Relative paths given on the command line are relative to the working
/// directory, not to the scene file.
fn source_from_cli(raw: &str, cwd: &Path) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("://") || Path::new(trimmed).is_absolute() {
        return trimmed.to_string();
    }
    cwd.join(trimmed).display().to_string()
}

pub fn renderer_config(scene: &ResolvedScene) -> Result<RendererConfig> {
    let base_dir = scene.base_dir.as_deref();
    let images = vec![
        ImageSource::parse(&scene.image_original, base_dir)?,
        ImageSource::parse(&scene.image_depth, base_dir)?,
    ];
    let fetcher = SourceFetcher::new(scene.page_origin.as_deref(), &scene.headers)
        .context("failed to configure image fetcher")?;

    let fragment_source = scene
        .fragment_shader
        .as_deref()
        .map(|path| {
            fs::read_to_string(path)
                .with_context(|| format!("failed to read fragment shader {}", path.display()))
        })
        .transpose()?;

    let orientation_root = scene.orientation.then(|| {
        scene
            .sensor_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SENSOR_ROOT))
    });

    let mut config = RendererConfig::new(images, Arc::new(fetcher));
    config.title = scene.title.clone();
    config.surface_size = scene.window_size.unwrap_or(DEFAULT_WINDOW_SIZE);
    config.load_timeout = scene.load_timeout;
    config.thresholds = Thresholds {
        horizontal: scene.horizontal_threshold,
        vertical: scene.vertical_threshold,
    };
    config.fragment_source = fragment_source;
    config.smoothing = scene.smoothing;
    config.max_tilt = scene.max_tilt;
    config.orientation_root = orientation_root;
    Ok(config)
}
