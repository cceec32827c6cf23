//! GPU side of the viewer.
//!
//! - `context` owns the wgpu instance, device and surface and reconfigures
//!   the swapchain when the window resizes.
//! - `pipeline` turns an already-linked [`crate::program::ShaderProgram`]
//!   into a render pipeline with two bind group layouts (uniforms, images).
//! - `uniforms` is the queue-backed uniform target the scene binders write to.
//! - `textures` uploads the colour/depth pair once both images are loaded.
//! - `state` glues everything together and exposes the `GpuState` API used by
//!   `window`.

mod context;
mod pipeline;
mod state;
mod textures;
mod uniforms;

pub(crate) use state::{GpuState, SceneSettings};
