// Commands - Everything a caller can ask of the transport thread

use crate::sequencer::{LoopWindow, PatternId};

/// Control-surface commands; all mutations are boundary-aligned on the
/// transport side, so senders can fire these at any moment
#[derive(Debug, Clone)]
pub enum TransportCommand {
    Start(PatternId),
    Stop,
    /// Swap the loop window at the next bar line
    RequestLoop(LoopWindow),
    /// Swap the main pattern at the next phrase line
    RequestMain(PatternId),
    /// Queue a one-bar fill for the next phrase line
    RequestFill(PatternId),
    /// Retime the grid from the very next step
    RequestTempo(f64),
    /// Change steps-per-bar at the next bar line
    RequestResolution(u32),
    /// Engage or release the repeat-hold override
    RepeatHold(bool),
    /// Engage or release the reverse-hold override
    ReverseHold(bool),
    /// Toggle the declick fade on scheduled triggers
    SetGapless(bool),
    Shutdown,
}
