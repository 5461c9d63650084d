//! Frame pacing for the run loop.
//!
//! Exactly one pacer drives the machine at a time. The fixed-interval
//! pacer releases frames against a deadline clock and drops backlog
//! rather than bursting to catch up; the vsync pacer gates on the
//! display's redraw callback and refuses to double-render when the
//! display runs faster than the target rate.
//!
//! Pacers take the current instant as an argument so tests can drive
//! them with a synthetic clock.

use std::time::{Duration, Instant};

use crate::config::PacerKind;

/// Target frame interval for ~60 Hz NTSC.
pub const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

// Vsync callbacks can arrive marginally early on a 60 Hz display.
const VSYNC_EPSILON: Duration = Duration::from_millis(1);

/// Decides when the run loop may emulate the next frame.
pub trait FramePacer {
    /// Frames to emulate at `now`. Zero means wait.
    fn frames_due(&mut self, now: Instant) -> u32;

    /// When the next frame falls due, for sleep scheduling. `None` when
    /// the pacer has no deadline of its own (display-driven).
    fn next_deadline(&self) -> Option<Instant>;

    /// Re-anchor after a pause so the backlog is not replayed.
    fn reset(&mut self, now: Instant);
}

/// Deadline-based pacer targeting one frame per interval.
pub struct FixedIntervalPacer {
    interval: Duration,
    deadline: Instant,
}

impl FixedIntervalPacer {
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self::with_interval(now, FRAME_INTERVAL)
    }

    #[must_use]
    pub fn with_interval(now: Instant, interval: Duration) -> Self {
        Self {
            interval,
            deadline: now + interval,
        }
    }
}

impl FramePacer for FixedIntervalPacer {
    fn frames_due(&mut self, now: Instant) -> u32 {
        if now < self.deadline {
            return 0;
        }
        self.deadline += self.interval;
        if self.deadline <= now {
            // A whole interval behind: drop the missed frames and
            // re-anchor instead of bursting.
            self.deadline = now + self.interval;
        }
        1
    }

    fn next_deadline(&self) -> Option<Instant> {
        Some(self.deadline)
    }

    fn reset(&mut self, now: Instant) {
        self.deadline = now + self.interval;
    }
}

/// Display-driven pacer: one frame per redraw, but never more than one
/// per frame interval.
pub struct VsyncPacer {
    interval: Duration,
    last_render: Option<Instant>,
}

impl VsyncPacer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_interval(FRAME_INTERVAL)
    }

    #[must_use]
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_render: None,
        }
    }
}

impl Default for VsyncPacer {
    fn default() -> Self {
        Self::new()
    }
}

impl FramePacer for VsyncPacer {
    fn frames_due(&mut self, now: Instant) -> u32 {
        if let Some(last) = self.last_render {
            if now.duration_since(last) + VSYNC_EPSILON < self.interval {
                return 0;
            }
        }
        self.last_render = Some(now);
        1
    }

    fn next_deadline(&self) -> Option<Instant> {
        None
    }

    fn reset(&mut self, now: Instant) {
        let _ = now;
        self.last_render = None;
    }
}

impl PacerKind {
    /// Build the pacer this kind names.
    #[must_use]
    pub fn create(self, now: Instant) -> Box<dyn FramePacer> {
        match self {
            PacerKind::FixedInterval => Box::new(FixedIntervalPacer::new(now)),
            PacerKind::Vsync => Box::new(VsyncPacer::new()),
        }
    }
}
