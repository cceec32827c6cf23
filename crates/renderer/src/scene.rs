//! Viewport math and the uniform-facing scene state.
//!
//! Everything here is GPU-free: writes go through a [`UniformTarget`], so the
//! same code drives the real uniform buffer and the recording target used in
//! tests.

use tracing::debug;

use crate::input::{pointer_target, tilt_target, InputState};
use crate::program::UniformLayout;
use crate::types::Thresholds;
use crate::uniform::{Uniform, Uniform1f, Uniform2f, Uniform4f, UniformTarget};

/// Surface size in physical pixels together with the scale factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub physical_width: u32,
    pub physical_height: u32,
    pub pixel_ratio: f32,
}

impl Viewport {
    pub fn new(physical_width: u32, physical_height: u32, pixel_ratio: f64) -> Self {
        let pixel_ratio = if pixel_ratio.is_finite() && pixel_ratio > 0.0 {
            pixel_ratio as f32
        } else {
            1.0
        };
        Self {
            physical_width,
            physical_height,
            pixel_ratio,
        }
    }

    /// Logical width in CSS-style pixels.
    pub fn width(&self) -> f32 {
        self.physical_width as f32 / self.pixel_ratio
    }

    pub fn height(&self) -> f32 {
        self.physical_height as f32 / self.pixel_ratio
    }

    pub fn is_empty(&self) -> bool {
        self.physical_width == 0 || self.physical_height == 0
    }
}

/// Scale applied to centred texture coordinates so the colour image covers
/// the viewport without distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectCorrection {
    pub a1: f32,
    pub a2: f32,
}

/// `image_aspect` is the colour image's `height / width`.
pub fn aspect_correction(width: f32, height: f32, image_aspect: f32) -> AspectCorrection {
    let viewport_aspect = height / width;
    if viewport_aspect < image_aspect {
        AspectCorrection {
            a1: 1.0,
            a2: viewport_aspect / image_aspect,
        }
    } else {
        AspectCorrection {
            a1: (width / height) * image_aspect,
            a2: 1.0,
        }
    }
}

/// The five binders the fragment shader reads.
pub struct SceneUniforms<T> {
    resolution: Uniform4f<T>,
    mouse: Uniform2f<T>,
    time: Uniform1f<T>,
    pixel_ratio: Uniform1f<T>,
    threshold: Uniform2f<T>,
}

impl<T: UniformTarget + Clone> SceneUniforms<T> {
    pub fn bind(layout: &UniformLayout, target: T) -> Self {
        Self {
            resolution: Uniform::new("resolution", layout, target.clone()),
            mouse: Uniform::new("mouse", layout, target.clone()),
            time: Uniform::new("time", layout, target.clone()),
            pixel_ratio: Uniform::new("pixelRatio", layout, target.clone()),
            threshold: Uniform::new("threshold", layout, target),
        }
    }
}

/// Input, viewport and image aspect, pushed to the uniforms as they change.
pub struct ParallaxScene<T> {
    uniforms: SceneUniforms<T>,
    input: InputState,
    thresholds: Thresholds,
    max_tilt: f32,
    image_aspect: Option<f32>,
    viewport: Option<Viewport>,
}

impl<T: UniformTarget> ParallaxScene<T> {
    pub fn new(
        uniforms: SceneUniforms<T>,
        thresholds: Thresholds,
        smoothing: f32,
        max_tilt: f32,
    ) -> Self {
        Self {
            uniforms,
            input: InputState::new(smoothing),
            thresholds,
            max_tilt,
            image_aspect: None,
            viewport: None,
        }
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// Records the colour image aspect and re-applies the last viewport.
    pub fn set_image_aspect(&mut self, image_aspect: f32) -> Option<AspectCorrection> {
        self.image_aspect = Some(image_aspect);
        let viewport = self.viewport?;
        self.resize(viewport)
    }

    /// Stores the viewport and, once the image aspect is known, pushes
    /// `resolution`, `pixelRatio` and `threshold`.
    ///
    /// Empty viewports are ignored so a minimised window keeps its last state.
    pub fn resize(&mut self, viewport: Viewport) -> Option<AspectCorrection> {
        if viewport.is_empty() {
            return None;
        }
        self.viewport = Some(viewport);
        let image_aspect = self.image_aspect?;

        let (width, height) = (viewport.width(), viewport.height());
        let correction = aspect_correction(width, height, image_aspect);
        self.uniforms
            .resolution
            .set([width, height, correction.a1, correction.a2]);
        self.uniforms.pixel_ratio.set([1.0 / viewport.pixel_ratio]);
        self.uniforms
            .threshold
            .set([self.thresholds.horizontal, self.thresholds.vertical]);
        debug!(
            width,
            height,
            pixel_ratio = viewport.pixel_ratio,
            a1 = correction.a1,
            a2 = correction.a2,
            "viewport updated"
        );
        Some(correction)
    }

    /// Cursor position in physical pixels against the current window size.
    pub fn pointer_moved(&mut self, x: f64, y: f64, width: u32, height: u32) {
        if let Some(target) = pointer_target(x, y, f64::from(width), f64::from(height)) {
            self.input.set_target(target);
        }
    }

    /// Tilt angles in degrees; overwrites any pointer target.
    pub fn orientation_changed(&mut self, gamma: f32, beta: f32) {
        if let Some(target) = tilt_target(gamma, beta, self.max_tilt) {
            self.input.set_target(target);
        }
    }

    /// Per-frame update: time, then one smoothing step pushed to `mouse`.
    pub fn advance(&mut self, elapsed_seconds: f32) {
        self.uniforms.time.set([elapsed_seconds]);
        let (x, y) = self.input.step();
        self.uniforms.mouse.set([x, y]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ShaderProgram;
    use crate::uniform::testing::RecordingTarget;

    fn scene() -> (ParallaxScene<RecordingTarget>, RecordingTarget, UniformLayout) {
        let program = ShaderProgram::builtin().unwrap();
        let layout = program.layout().clone();
        let target = RecordingTarget::default();
        let uniforms = SceneUniforms::bind(&layout, target.clone());
        let thresholds = Thresholds {
            horizontal: 35.0,
            vertical: 15.0,
        };
        (
            ParallaxScene::new(uniforms, thresholds, 0.05, 25.0),
            target,
            layout,
        )
    }

    fn value(target: &RecordingTarget, layout: &UniformLayout, name: &str) -> Option<Vec<f32>> {
        layout
            .member(name)
            .and_then(|slot| target.value_at(slot.offset))
    }

    #[test]
    fn landscape_viewport_on_square_image() {
        let correction = aspect_correction(800.0, 600.0, 1.0);
        assert_eq!(correction, AspectCorrection { a1: 1.0, a2: 0.75 });
    }

    #[test]
    fn portrait_viewport_on_square_image() {
        let correction = aspect_correction(600.0, 800.0, 1.0);
        assert!((correction.a1 - 0.75).abs() < 1e-6);
        assert_eq!(correction.a2, 1.0);
    }

    #[test]
    fn resize_waits_for_image_aspect() {
        let (mut scene, target, _) = scene();
        assert_eq!(scene.resize(Viewport::new(800, 600, 1.0)), None);
        assert_eq!(target.write_count(), 0);

        let correction = scene.set_image_aspect(1.0).unwrap();
        assert_eq!(correction, AspectCorrection { a1: 1.0, a2: 0.75 });
    }

    #[test]
    fn resize_pushes_logical_size_and_inverse_ratio() {
        let (mut scene, target, layout) = scene();
        scene.set_image_aspect(1.0);
        scene.resize(Viewport::new(1600, 1200, 2.0));

        assert_eq!(
            value(&target, &layout, "resolution"),
            Some(vec![800.0, 600.0, 1.0, 0.75])
        );
        assert_eq!(value(&target, &layout, "pixelRatio"), Some(vec![0.5]));
        assert_eq!(value(&target, &layout, "threshold"), Some(vec![35.0, 15.0]));
    }

    #[test]
    fn resize_is_deterministic() {
        let (mut scene, target, layout) = scene();
        scene.set_image_aspect(0.5);
        scene.resize(Viewport::new(1024, 768, 1.25));
        let first = value(&target, &layout, "resolution");
        scene.resize(Viewport::new(300, 300, 1.0));
        scene.resize(Viewport::new(1024, 768, 1.25));
        assert_eq!(value(&target, &layout, "resolution"), first);
    }

    #[test]
    fn empty_viewport_is_ignored() {
        let (mut scene, target, _) = scene();
        scene.set_image_aspect(1.0);
        scene.resize(Viewport::new(800, 600, 1.0));
        let writes = target.write_count();
        assert_eq!(scene.resize(Viewport::new(0, 600, 1.0)), None);
        assert_eq!(target.write_count(), writes);
        assert_eq!(scene.viewport(), Some(Viewport::new(800, 600, 1.0)));
    }

    #[test]
    fn advance_pushes_time_and_smoothed_mouse() {
        let (mut scene, target, layout) = scene();
        scene.pointer_moved(0.0, 600.0, 800, 600);
        scene.advance(1.5);

        assert_eq!(value(&target, &layout, "time"), Some(vec![1.5]));
        let mouse = value(&target, &layout, "mouse").unwrap();
        assert!((mouse[0] - 0.05).abs() < 1e-6);
        assert!((mouse[1] + 0.05).abs() < 1e-6);
    }

    #[test]
    fn orientation_overwrites_pointer_target() {
        let (mut scene, _, _) = scene();
        scene.pointer_moved(0.0, 0.0, 800, 600);
        scene.orientation_changed(50.0, -10.0);
        assert!((scene.input().target_x - 1.0).abs() < 1e-6);
        assert!((scene.input().target_y + 0.4).abs() < 1e-6);
    }
}
