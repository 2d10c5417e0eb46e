// Timing - Frame-counted device clock shared with the audio callback

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic clock driven by frames the output stream has rendered
///
/// The callback advances it, everything else reads it. Frame counting keeps
/// it locked to the device rather than to the OS wall clock.
#[derive(Debug, Clone)]
pub struct DeviceClock {
    frames: Arc<AtomicU64>,
    sample_rate: f64,
}

impl DeviceClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate: sample_rate as f64,
        }
    }

    /// Called from the audio callback after each rendered buffer
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn frame_position(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn now_seconds(&self) -> f64 {
        self.frame_position() as f64 / self.sample_rate
    }

    pub fn seconds_to_frames(&self, seconds: f64) -> u64 {
        (seconds * self.sample_rate).round() as u64
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}
