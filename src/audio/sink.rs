// Sink - The scheduling boundary between the transport and audio output

use crate::audio::SinkResult;

/// One slice playback, placed on the device clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledTrigger {
    /// Device-clock start time in seconds
    pub start_time: f64,
    /// Nominal duration in seconds (a sub-step for retrigs)
    pub duration: f64,
    pub slice_index: usize,
    pub gain: f32,
    /// Fade out over the tail instead of cutting hard
    pub fade_out: bool,
}

impl ScheduledTrigger {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Where resolved triggers go
///
/// The transport only ever reads the clock and hands over triggers; the sink
/// owns voices, mixing and the actual device stream. Tests swap in a
/// collecting implementation with a hand-driven clock.
pub trait AudioSink {
    /// Current device-clock time in seconds
    fn clock_time(&self) -> SinkResult<f64>;

    /// Queue a trigger for sample-accurate playback
    fn schedule(&mut self, trigger: ScheduledTrigger) -> SinkResult<()>;

    /// Drop everything queued and silence active voices
    fn cancel_all(&mut self);
}
