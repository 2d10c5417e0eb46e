// Audio - Device output, slice playback, timing and offline rendering

pub mod engine;
pub mod render;
pub mod sink;
pub mod slices;
pub mod timing;
pub mod voice;

pub use engine::CpalSink;
pub use render::{OfflineRenderer, RenderJob, RenderSettings};
pub use sink::{AudioSink, ScheduledTrigger};
pub use slices::{SliceCell, SliceTable, SourceBuffer, SustainLoop};
pub use timing::DeviceClock;
pub use voice::SliceVoice;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("No audio output device available")]
    NoDevice,

    #[error("Device clock unavailable: {0}")]
    ClockUnavailable(String),

    #[error("Failed to configure output stream: {0}")]
    StreamConfig(String),

    #[error("Failed to schedule trigger: {0}")]
    Schedule(String),
}

pub type SinkResult<T> = Result<T, SinkError>;
