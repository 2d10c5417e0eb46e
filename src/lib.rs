// loopflip - Re-sequencing transport for sliced audio loops

pub mod audio;
pub mod messaging;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use audio::engine::CpalSink;
pub use audio::render::{OfflineRenderer, RenderJob, RenderSettings};
pub use audio::sink::{AudioSink, ScheduledTrigger};
pub use audio::slices::{SliceTable, SourceBuffer, SustainLoop};
pub use audio::timing::DeviceClock;
pub use audio::voice::SliceVoice;
pub use messaging::channels::create_command_channel;
pub use messaging::command::TransportCommand;
pub use messaging::progress::PlaybackProgress;
pub use sequencer::{
    GridResolution, LoopPlayer, LoopWindow, Pattern, PatternBank, PatternId, RolePool,
    RoleResolver, SliceRole, StepEvent, StepResolver, Tempo, Transport, TransportError,
    TransportResult,
};
