use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use imagery::PendingImages;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use tracing::{debug, error, info, warn};

use crate::frame::{CancellationToken, FrameLoop, FrameOutcome, SystemTimeSource};
use crate::gpu::{GpuState, SceneSettings};
use crate::orientation::OrientationSensor;
use crate::program::ShaderProgram;
use crate::scene::Viewport;
use crate::types::RendererConfig;

/// How often pending image loads are polled while nothing is drawn.
const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(15);

/// Lifecycle of the viewer once the window exists.
enum Phase {
    WaitingForImages(PendingImages),
    Running,
    Failed,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::WaitingForImages(_) => "waiting-for-images",
            Phase::Running => "running",
            Phase::Failed => "failed",
        }
    }
}

/// Window, GPU resources and input sources for one viewer session.
///
/// `gpu` is declared before `window` so the surface is dropped first.
struct ParallaxApp {
    gpu: GpuState,
    orientation: Option<OrientationSensor>,
    phase: Phase,
    frames: FrameLoop<SystemTimeSource>,
    window: Arc<Window>,
}

impl ParallaxApp {
    /// Initializing: GPU context, pipeline, binders, quad, image loads and
    /// the optional orientation sensor, in that order.
    fn new(
        window: Arc<Window>,
        config: &RendererConfig,
        program: &ShaderProgram,
        token: CancellationToken,
    ) -> Result<Self> {
        let size = window.inner_size();
        let viewport = Viewport::new(size.width, size.height, window.scale_factor());
        let gpu = GpuState::new(
            window.as_ref(),
            size,
            viewport,
            program,
            SceneSettings {
                thresholds: config.thresholds,
                smoothing: config.smoothing,
                max_tilt: config.max_tilt,
            },
        )?;

        let pending = imagery::load_images(
            Arc::clone(&config.fetcher),
            config.images.clone(),
            config.load_timeout,
        )
        .context("failed to start image loads")?;
        info!(count = config.images.len(), "waiting for images");

        let orientation = config.orientation_root.as_deref().and_then(|root| {
            OrientationSensor::acquire(root)
                .map_err(|err| warn!(error = %err, "device orientation unavailable"))
                .ok()
        });

        Ok(Self {
            gpu,
            orientation,
            phase: Phase::WaitingForImages(pending),
            frames: FrameLoop::new(SystemTimeSource::new(), token),
            window,
        })
    }

    fn viewport(&self, size: PhysicalSize<u32>, scale_factor: f64) -> Viewport {
        Viewport::new(size.width, size.height, scale_factor)
    }

    /// Polls the image loads. Returns the instant to wake at next while the
    /// loads are still outstanding.
    fn poll_images(&mut self, now: Instant) -> Result<Option<Instant>> {
        let Phase::WaitingForImages(pending) = &mut self.phase else {
            return Ok(None);
        };
        let Some(images) = pending.poll(now)? else {
            return Ok(Some((now + LOAD_POLL_INTERVAL).min(pending.deadline())));
        };

        self.gpu.attach_images(&images)?;
        let size = self.window.inner_size();
        let viewport = self.viewport(size, self.window.scale_factor());
        self.gpu.resize(viewport);
        self.set_phase(Phase::Running);
        self.frames.start(self.window.as_ref());
        Ok(None)
    }

    fn set_phase(&mut self, phase: Phase) {
        info!(from = self.phase.name(), to = phase.name(), "viewer state changed");
        self.phase = phase;
    }

    fn handle_keyboard(&mut self, event: &KeyEvent) {
        if event.state == ElementState::Pressed
            && matches!(event.logical_key, Key::Named(NamedKey::Escape))
        {
            debug!("escape pressed; stopping");
            self.frames.token().cancel();
        }
    }

    /// Runs one frame. Surface hiccups are recovered here; anything returned
    /// is fatal.
    fn redraw(&mut self) -> Result<FrameOutcome> {
        if let Some(sample) = self.orientation.as_ref().and_then(OrientationSensor::latest) {
            self.gpu
                .scene_mut()
                .orientation_changed(sample.gamma, sample.beta);
        }

        let gpu = &mut self.gpu;
        let outcome = self
            .frames
            .on_frame(self.window.as_ref(), |sample| gpu.render(sample.seconds));
        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                debug!("surface lost or outdated; reconfiguring");
                self.gpu.reconfigure();
                Ok(FrameOutcome::Rendered)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("surface timeout; retrying next frame");
                Ok(FrameOutcome::Rendered)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(anyhow!("surface out of memory")),
            Err(other) => {
                warn!(error = %other, "surface error; retrying next frame");
                Ok(FrameOutcome::Rendered)
            }
        }
    }

    fn handle_event(&mut self, event: Event<()>, elwt: &EventLoopWindowTarget<()>) -> Result<()> {
        match event {
            Event::WindowEvent { window_id, event } if window_id == self.window.id() => {
                match event {
                    WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                        self.frames.token().cancel();
                    }
                    WindowEvent::KeyboardInput { event, .. } => self.handle_keyboard(&event),
                    WindowEvent::CursorMoved { position, .. } => {
                        let size = self.window.inner_size();
                        self.gpu.scene_mut().pointer_moved(
                            position.x,
                            position.y,
                            size.width,
                            size.height,
                        );
                    }
                    WindowEvent::Resized(new_size) => {
                        let viewport = self.viewport(new_size, self.window.scale_factor());
                        self.gpu.resize(viewport);
                    }
                    WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                        let viewport = self.viewport(self.window.inner_size(), scale_factor);
                        self.gpu.resize(viewport);
                    }
                    WindowEvent::RedrawRequested => {
                        if matches!(self.phase, Phase::Running)
                            && self.redraw()? == FrameOutcome::Stopped
                        {
                            debug!("frame loop stopped");
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                if self.frames.token().is_cancelled() {
                    elwt.exit();
                    return Ok(());
                }
                match self.poll_images(Instant::now())? {
                    Some(wake_at) => elwt.set_control_flow(ControlFlow::WaitUntil(wake_at)),
                    None => elwt.set_control_flow(ControlFlow::Wait),
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Entry point that owns the window and event loop.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Opens the window and blocks until the viewer exits.
    ///
    /// Shader compilation happens first, so a broken shader fails before a
    /// window, surface or buffer is created.
    pub fn run(self) -> Result<()> {
        let config = self.config;
        let program = match config.fragment_source.as_deref() {
            Some(fragment) => ShaderProgram::with_fragment(fragment),
            None => ShaderProgram::builtin(),
        }
        .context("failed to compile shader program")?;

        let event_loop =
            EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
        let (width, height) = config.surface_size;
        let window = WindowBuilder::new()
            .with_title(config.title.as_str())
            .with_inner_size(LogicalSize::new(width, height))
            .build(&event_loop)
            .map_err(|err| anyhow!("failed to create viewer window: {err}"))?;
        let window = Arc::new(window);

        let token = CancellationToken::new();
        let mut app = ParallaxApp::new(window, &config, &program, token)
            .context("failed to initialise viewer")?;

        let failure: Rc<RefCell<Option<anyhow::Error>>> = Rc::new(RefCell::new(None));
        let failure_slot = Rc::clone(&failure);
        let run_result = event_loop.run(move |event, elwt| {
            if let Err(err) = app.handle_event(event, elwt) {
                error!("{err:#}");
                app.set_phase(Phase::Failed);
                app.frames.token().cancel();
                failure_slot.borrow_mut().get_or_insert(err);
                elwt.exit();
            }
        });

        if let Some(err) = failure.borrow_mut().take() {
            return Err(err);
        }
        run_result.map_err(|err| anyhow!("window event loop error: {err}"))
    }
}
