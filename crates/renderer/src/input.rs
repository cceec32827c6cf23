//! Pointer and tilt targets plus per-frame smoothing.

/// Fraction of the remaining distance covered each frame.
pub use sceneconfig::DEFAULT_SMOOTHING;

/// Smoothed position chasing a target in [-1, 1]².
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputState {
    pub x: f32,
    pub y: f32,
    pub target_x: f32,
    pub target_y: f32,
    smoothing: f32,
}

impl Default for InputState {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING)
    }
}

impl InputState {
    pub fn new(smoothing: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            target_x: 0.0,
            target_y: 0.0,
            smoothing,
        }
    }

    pub fn set_target(&mut self, (x, y): (f32, f32)) {
        self.target_x = x;
        self.target_y = y;
    }

    /// Advances one frame, whether or not the target moved.
    pub fn step(&mut self) -> (f32, f32) {
        self.x += (self.target_x - self.x) * self.smoothing;
        self.y += (self.target_y - self.y) * self.smoothing;
        (self.x, self.y)
    }
}

/// Maps a cursor position to a target relative to the window centre.
///
/// The centre maps to zero and the left/top edges to +1. A zero-sized window
/// yields no target.
pub fn pointer_target(x: f64, y: f64, width: f64, height: f64) -> Option<(f32, f32)> {
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    let half_width = width / 2.0;
    let half_height = height / 2.0;
    Some((
        ((half_width - x) / half_width) as f32,
        ((half_height - y) / half_height) as f32,
    ))
}

/// Maps device tilt in degrees to a target, saturating at `max_tilt`.
///
/// Samples carrying non-finite angles are dropped.
pub fn tilt_target(gamma: f32, beta: f32, max_tilt: f32) -> Option<(f32, f32)> {
    if !gamma.is_finite() || !beta.is_finite() {
        return None;
    }
    Some((
        gamma.clamp(-max_tilt, max_tilt) / max_tilt,
        beta.clamp(-max_tilt, max_tilt) / max_tilt,
    ))
}
