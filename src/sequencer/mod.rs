// Sequencer - Transport, grid math, patterns and step resolution

pub mod grid;
pub mod player;
pub mod resolve;
pub mod roles;
pub mod step;
pub mod transport;

pub use grid::{BASE_STEPS_PER_BAR, GridResolution, LoopWindow, PHRASE_BARS, Tempo};
pub use player::LoopPlayer;
pub use resolve::{ResolveMode, ResolveRequest, ResolvedTrigger, StepResolver, sub_step_intervals};
pub use roles::{ROLE_MARKER_BASE, RolePool, RoleResolver, SliceRole};
pub use step::{Pattern, PatternBank, PatternId, PatternKind, StepEvent};
pub use transport::{PendingMutations, Transport};

use crate::audio::SinkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No pattern with id {0} in the bank (or wrong kind)")]
    InvalidPattern(PatternId),

    #[error("Audio clock unavailable: {0}")]
    ClockUnavailable(String),

    #[error("Loop window {start_sec}..{end_sec} is not playable")]
    InconsistentLoopRequest { start_sec: f64, end_sec: f64 },

    #[error("Unsupported grid resolution: {0} steps per bar")]
    InvalidResolution(u32),

    #[error("Tempo {0} BPM is outside the playable range")]
    InvalidTempo(f64),

    #[error("Audio sink error: {0}")]
    Sink(#[from] SinkError),
}

pub type TransportResult<T> = Result<T, TransportError>;
