//! Renderer crate for the depth parallax viewer.
//!
//! A colour image and its depth map are sampled by one fragment shader that
//! displaces colour lookups by `(depth - 0.5) * mouse / threshold`. The flow:
//!
//! ```text
//!   CLI / parallax
//!          │ RendererConfig
//!          ▼
//!   Renderer::run ──▶ compile ShaderProgram ──▶ winit event loop
//!                                                 │
//!          WaitingForImages ◀── imagery loads ────┤
//!                 │ both images decoded           │
//!                 ▼                               │
//!              Running ──▶ FrameLoop::on_frame ──▶ ParallaxScene::advance ─▶ GPU UBO
//! ```
//!
//! The scene math, uniform binders, shader reflection, input smoothing and
//! frame scheduling are GPU-free and tested headless; `gpu` and `window` are
//! the thin wgpu/winit glue around them.

mod geometry;
mod gpu;
mod window;

pub mod frame;
pub mod input;
pub mod orientation;
pub mod program;
pub mod scene;
pub mod types;
pub mod uniform;

pub use frame::{CancellationToken, FrameLoop, FrameOutcome, FrameScheduler, TimeSource};
pub use geometry::QuadGeometry;
pub use orientation::{OrientationError, OrientationSensor};
pub use program::{ProgramError, ShaderProgram, Stage, UniformLayout, UniformSlot};
pub use scene::{aspect_correction, AspectCorrection, ParallaxScene, Viewport};
pub use types::{RendererConfig, Thresholds};
pub use uniform::{Uniform, Uniform1f, Uniform2f, Uniform4f, UniformTarget};
pub use window::Renderer;
