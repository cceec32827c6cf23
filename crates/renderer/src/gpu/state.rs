use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::RgbaImage;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};
use winit::dpi::PhysicalSize;

use crate::geometry::QuadGeometry;
use crate::program::ShaderProgram;
use crate::scene::{ParallaxScene, SceneUniforms, Viewport};
use crate::types::Thresholds;

use super::context::GpuContext;
use super::pipeline::ParallaxPipeline;
use super::textures::TexturePair;
use super::uniforms::UniformBuffer;

/// Input shaping handed to the scene.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SceneSettings {
    pub thresholds: Thresholds,
    pub smoothing: f32,
    pub max_tilt: f32,
}

/// Every GPU resource the viewer owns, plus the scene that feeds the uniforms.
pub(crate) struct GpuState {
    scene: ParallaxScene<UniformBuffer>,
    textures: Option<TexturePair>,
    quad: QuadGeometry,
    uniform_bind_group: wgpu::BindGroup,
    _uniforms: UniformBuffer,
    pipeline: ParallaxPipeline,
    context: GpuContext,
    last_stats: Instant,
    frames_since_stats: u32,
}

impl GpuState {
    /// `program` has already compiled on the CPU; a GPU-side rejection is
    /// reported before the uniform buffer or quad are allocated.
    pub(crate) fn new<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        viewport: Viewport,
        program: &ShaderProgram,
        settings: SceneSettings,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, initial_size)?;
        let pipeline = ParallaxPipeline::new(&context.device, context.surface_format, program)
            .context("failed to build render pipeline")?;

        let uniforms = UniformBuffer::new(&context.device, &context.queue, program.layout().size());
        let uniform_bind_group = context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("uniform bind group"),
                layout: &pipeline.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.buffer().as_entire_binding(),
                }],
            });

        let mut scene = ParallaxScene::new(
            SceneUniforms::bind(program.layout(), uniforms.clone()),
            settings.thresholds,
            settings.smoothing,
            settings.max_tilt,
        );
        scene.resize(viewport);
        let quad = QuadGeometry::new(&context.device);

        Ok(Self {
            scene,
            textures: None,
            quad,
            uniform_bind_group,
            _uniforms: uniforms,
            pipeline,
            context,
            last_stats: Instant::now(),
            frames_since_stats: 0,
        })
    }

    pub(crate) fn scene_mut(&mut self) -> &mut ParallaxScene<UniformBuffer> {
        &mut self.scene
    }

    pub(crate) fn resize(&mut self, viewport: Viewport) {
        if viewport.is_empty() {
            return;
        }
        self.context.resize(PhysicalSize::new(
            viewport.physical_width,
            viewport.physical_height,
        ));
        self.scene.resize(viewport);
    }

    pub(crate) fn reconfigure(&mut self) {
        self.context.reconfigure();
    }

    /// Uploads the loaded images and applies the colour image aspect.
    pub(crate) fn attach_images(&mut self, images: &[RgbaImage]) -> Result<()> {
        let textures = TexturePair::new(
            &self.context.device,
            &self.context.queue,
            &self.pipeline.texture_layout,
            images,
            self.context.max_texture_dimension,
        )
        .context("failed to create image textures")?;
        let correction = self.scene.set_image_aspect(textures.image_aspect());
        info!(
            image_aspect = textures.image_aspect(),
            ?correction,
            "images attached"
        );
        self.textures = Some(textures);
        Ok(())
    }

    /// Advances the scene to `elapsed_seconds` and draws one frame.
    ///
    /// Does nothing until the images are attached.
    pub(crate) fn render(&mut self, elapsed_seconds: f32) -> Result<(), wgpu::SurfaceError> {
        let Some(textures) = self.textures.as_ref() else {
            return Ok(());
        };
        self.scene.advance(elapsed_seconds);

        let frame = self.context.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("render encoder"),
                });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            let size = self.context.size;
            render_pass.set_viewport(0.0, 0.0, size.width as f32, size.height as f32, 0.0, 1.0);
            render_pass.set_pipeline(&self.pipeline.pipeline);
            render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            render_pass.set_bind_group(1, textures.bind_group(), &[]);
            self.quad.render(&mut render_pass);
        }
        self.context.queue.submit(Some(encoder.finish()));
        frame.present();

        self.record_stats(elapsed_seconds);
        Ok(())
    }

    fn record_stats(&mut self, elapsed_seconds: f32) {
        self.frames_since_stats += 1;
        let now = Instant::now();
        let since = now.saturating_duration_since(self.last_stats);
        if since >= Duration::from_secs(1) {
            let input = self.scene.input();
            debug!(
                fps = (self.frames_since_stats as f32 / since.as_secs_f32()).round(),
                time = elapsed_seconds,
                mouse_x = input.x,
                mouse_y = input.y,
                "render stats"
            );
            self.frames_since_stats = 0;
            self.last_stats = now;
        }
    }
}
