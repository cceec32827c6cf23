use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Snapshot of the time state supplied to the shader uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Elapsed seconds since the loop started.
    pub seconds: f32,
}

impl TimeSample {
    pub fn new(seconds: f32) -> Self {
        Self { seconds }
    }
}

/// Abstraction over where time values originate from.
pub trait TimeSource: Send {
    /// Resets the source to its initial state.
    fn reset(&mut self);
    /// Produces a time sample for the next frame.
    fn sample(&mut self) -> TimeSample;
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn reset(&mut self) {
        self.origin = Instant::now();
    }

    fn sample(&mut self) -> TimeSample {
        TimeSample::new(self.origin.elapsed().as_secs_f32())
    }
}

/// Requests one frame callback, typically at the next display refresh.
pub trait FrameScheduler {
    fn schedule_frame(&self);
}

impl FrameScheduler for winit::window::Window {
    fn schedule_frame(&self) {
        self.request_redraw();
    }
}

/// Shared stop flag checked at every frame boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The body ran and the next frame was requested.
    Rendered,
    /// The token was cancelled; nothing ran and nothing was scheduled.
    Stopped,
}

/// Self-rescheduling, cancellable per-frame driver.
///
/// Each frame samples time, runs the body, then requests exactly one further
/// frame, so iterations never overlap.
pub struct FrameLoop<S = SystemTimeSource> {
    time: S,
    token: CancellationToken,
    running: bool,
}

impl<S: TimeSource> FrameLoop<S> {
    pub fn new(time: S, token: CancellationToken) -> Self {
        Self {
            time,
            token,
            running: false,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Restarts the clock and requests the first frame.
    pub fn start<F>(&mut self, scheduler: &F)
    where
        F: FrameScheduler + ?Sized,
    {
        if self.token.is_cancelled() {
            return;
        }
        self.time.reset();
        self.running = true;
        scheduler.schedule_frame();
    }

    /// Runs one iteration. A body error is returned after the next frame has
    /// been requested; the caller cancels the token when the error is fatal.
    pub fn on_frame<F, B, E>(&mut self, scheduler: &F, body: B) -> Result<FrameOutcome, E>
    where
        F: FrameScheduler + ?Sized,
        B: FnOnce(TimeSample) -> Result<(), E>,
    {
        if !self.running || self.token.is_cancelled() {
            self.running = false;
            return Ok(FrameOutcome::Stopped);
        }

        let sample = self.time.sample();
        let result = body(sample);
        if !self.token.is_cancelled() {
            scheduler.schedule_frame();
        }
        result.map(|()| FrameOutcome::Rendered)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[derive(Default)]
    struct CountingScheduler {
        requests: Cell<usize>,
    }

    impl FrameScheduler for CountingScheduler {
        fn schedule_frame(&self) {
            self.requests.set(self.requests.get() + 1);
        }
    }

    /// Advances a fixed step per sample.
    struct SteppingTimeSource {
        step: f32,
        frame: u64,
    }

    impl TimeSource for SteppingTimeSource {
        fn reset(&mut self) {
            self.frame = 0;
        }

        fn sample(&mut self) -> TimeSample {
            let sample = TimeSample::new(self.frame as f32 * self.step);
            self.frame += 1;
            sample
        }
    }

    fn frame_loop(token: CancellationToken) -> FrameLoop<SteppingTimeSource> {
        FrameLoop::new(
            SteppingTimeSource {
                step: 0.5,
                frame: 0,
            },
            token,
        )
    }

    #[test]
    fn each_frame_requests_exactly_one_more() {
        let scheduler = CountingScheduler::default();
        let mut frames = frame_loop(CancellationToken::new());
        frames.start(&scheduler);
        assert_eq!(scheduler.requests.get(), 1);

        let mut seen = Vec::new();
        for _ in 0..3 {
            let outcome = frames
                .on_frame(&scheduler, |sample| {
                    seen.push(sample.seconds);
                    Ok::<(), ()>(())
                })
                .unwrap();
            assert_eq!(outcome, FrameOutcome::Rendered);
        }
        assert_eq!(seen, vec![0.0, 0.5, 1.0]);
        assert_eq!(scheduler.requests.get(), 4);
    }

    #[test]
    fn cancellation_stops_at_next_boundary() {
        let scheduler = CountingScheduler::default();
        let token = CancellationToken::new();
        let mut frames = frame_loop(token.clone());
        frames.start(&scheduler);

        token.cancel();
        let mut ran = false;
        let outcome = frames
            .on_frame(&scheduler, |_| {
                ran = true;
                Ok::<(), ()>(())
            })
            .unwrap();
        assert_eq!(outcome, FrameOutcome::Stopped);
        assert!(!ran);
        assert_eq!(scheduler.requests.get(), 1);
        assert!(!frames.is_running());
    }

    #[test]
    fn frames_before_start_do_nothing() {
        let scheduler = CountingScheduler::default();
        let mut frames = frame_loop(CancellationToken::new());
        let outcome = frames
            .on_frame(&scheduler, |_| Ok::<(), ()>(()))
            .unwrap();
        assert_eq!(outcome, FrameOutcome::Stopped);
        assert_eq!(scheduler.requests.get(), 0);
    }

    #[test]
    fn body_error_is_returned_and_loop_continues() {
        let scheduler = CountingScheduler::default();
        let mut frames = frame_loop(CancellationToken::new());
        frames.start(&scheduler);
        let result = frames.on_frame(&scheduler, |_| Err("surface timeout"));
        assert_eq!(result, Err("surface timeout"));
        assert_eq!(scheduler.requests.get(), 2);
    }
}
