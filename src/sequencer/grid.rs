// Grid - Musical time parameters for the slice sequencer
// Handles conversion between tempo, grid steps, bars, and real time

use crate::sequencer::{TransportError, TransportResult};
use std::fmt;

/// The canonical subdivision all slice offsets are defined against
pub const BASE_STEPS_PER_BAR: u32 = 16;

/// Main-pattern and fill transitions align to two-bar phrase lines
pub const PHRASE_BARS: u32 = 2;

/// Loop lengths (in bars) a window may claim
pub const ALLOWED_BARS: [f64; 7] = [0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0];

/// Tempo in BPM (Beats Per Minute)
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    /// Creates a new tempo
    /// BPM must be in range [20.0, 999.0]
    pub fn new(bpm: f64) -> Self {
        assert!(
            (20.0..=999.0).contains(&bpm),
            "BPM must be between 20 and 999"
        );
        Self { bpm }
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one four-beat bar in seconds
    pub fn bar_duration_seconds(&self) -> f64 {
        self.beat_duration_seconds() * 4.0
    }

    /// Duration of one grid step at the given resolution
    pub fn step_duration_seconds(&self, resolution: GridResolution) -> f64 {
        self.bar_duration_seconds() / resolution.steps_per_bar() as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Grid resolution - how many steps subdivide one bar
///
/// Patterns are always expressed against the 16-step base grid; coarser or
/// finer resolutions re-map onto it during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GridResolution {
    steps_per_bar: u32,
}

impl GridResolution {
    /// Creates a resolution; accepted values are 4, 8, 16, and 32
    pub fn new(steps_per_bar: u32) -> TransportResult<Self> {
        match steps_per_bar {
            4 | 8 | 16 | 32 => Ok(Self { steps_per_bar }),
            other => Err(TransportError::InvalidResolution(other)),
        }
    }

    /// The base sixteenth-note grid
    pub fn base() -> Self {
        Self {
            steps_per_bar: BASE_STEPS_PER_BAR,
        }
    }

    /// Steps per bar at this resolution
    pub fn steps_per_bar(&self) -> u32 {
        self.steps_per_bar
    }

    /// Steps per two-bar phrase at this resolution
    pub fn steps_per_phrase(&self) -> u32 {
        self.steps_per_bar * PHRASE_BARS
    }

    /// Map a logical step at this resolution onto the base sixteenth grid
    ///
    /// At base resolution this is the identity; at 8 steps/bar each step
    /// covers two base cells, at 32 two steps share one cell.
    pub fn to_base_step(&self, step: u64) -> u64 {
        step * BASE_STEPS_PER_BAR as u64 / self.steps_per_bar as u64
    }
}

impl Default for GridResolution {
    fn default() -> Self {
        Self::base()
    }
}

impl fmt::Display for GridResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/bar", self.steps_per_bar)
    }
}

/// The selected region of the source recording
///
/// Immutable once captured into a playback schedule; changed only via a
/// queued loop mutation.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RawLoopWindow")]
pub struct LoopWindow {
    start_sec: f64,
    end_sec: f64,
    bars: f64,
}

/// Unvalidated mirror; deserialization funnels through `LoopWindow::new`
#[derive(serde::Deserialize)]
struct RawLoopWindow {
    start_sec: f64,
    end_sec: f64,
    bars: f64,
}

impl TryFrom<RawLoopWindow> for LoopWindow {
    type Error = TransportError;

    fn try_from(raw: RawLoopWindow) -> TransportResult<Self> {
        LoopWindow::new(raw.start_sec, raw.end_sec, raw.bars)
    }
}

impl LoopWindow {
    /// Creates a loop window, rejecting degenerate regions
    pub fn new(start_sec: f64, end_sec: f64, bars: f64) -> TransportResult<Self> {
        if !(end_sec > start_sec) || start_sec < 0.0 {
            return Err(TransportError::InconsistentLoopRequest { start_sec, end_sec });
        }
        if !ALLOWED_BARS.contains(&bars) {
            return Err(TransportError::InconsistentLoopRequest { start_sec, end_sec });
        }
        Ok(Self {
            start_sec,
            end_sec,
            bars,
        })
    }

    pub fn start_sec(&self) -> f64 {
        self.start_sec
    }

    pub fn end_sec(&self) -> f64 {
        self.end_sec
    }

    pub fn bars(&self) -> f64 {
        self.bars
    }

    /// Window duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.end_sec - self.start_sec
    }

    /// Number of base sixteenth cells the window is cut into
    pub fn base_step_count(&self) -> u64 {
        (self.bars * BASE_STEPS_PER_BAR as f64).round() as u64
    }

    /// The tempo the window implies when played at its natural rate
    ///
    /// A two-bar window of 4 seconds implies 120 BPM (8 beats / 4 s).
    pub fn implied_tempo(&self) -> Tempo {
        let bpm = self.bars * 4.0 * 60.0 / self.duration_seconds();
        Tempo::new(bpm.clamp(20.0, 999.0))
    }

    /// Natural duration of one base cell in seconds
    pub fn base_step_duration(&self) -> f64 {
        self.duration_seconds() / self.base_step_count() as f64
    }
}

impl fmt::Display for LoopWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3}s..{:.3}s ({} bars)",
            self.start_sec, self.end_sec, self.bars
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_durations() {
        let tempo = Tempo::new(120.0);
        assert_eq!(tempo.bpm(), 120.0);
        assert_eq!(tempo.beat_duration_seconds(), 0.5);
        assert_eq!(tempo.bar_duration_seconds(), 2.0);

        // 16 steps per bar at 120 BPM = 0.125s per step
        assert_eq!(tempo.step_duration_seconds(GridResolution::base()), 0.125);
    }

    #[test]
    fn test_resolution_validation() {
        assert!(GridResolution::new(16).is_ok());
        assert!(GridResolution::new(8).is_ok());
        assert!(GridResolution::new(7).is_err());
        assert!(GridResolution::new(0).is_err());
    }

    #[test]
    fn test_resolution_base_mapping() {
        let base = GridResolution::base();
        assert_eq!(base.to_base_step(5), 5);

        let eighths = GridResolution::new(8).unwrap();
        assert_eq!(eighths.to_base_step(0), 0);
        assert_eq!(eighths.to_base_step(1), 2);
        assert_eq!(eighths.to_base_step(7), 14);

        let thirty_seconds = GridResolution::new(32).unwrap();
        assert_eq!(thirty_seconds.to_base_step(3), 1);
        assert_eq!(thirty_seconds.to_base_step(4), 2);
    }

    #[test]
    fn test_loop_window_validation() {
        assert!(LoopWindow::new(0.0, 4.0, 2.0).is_ok());
        assert!(LoopWindow::new(4.0, 4.0, 2.0).is_err()); // zero length
        assert!(LoopWindow::new(5.0, 4.0, 2.0).is_err()); // negative length
        assert!(LoopWindow::new(-1.0, 4.0, 2.0).is_err()); // before start of source
        assert!(LoopWindow::new(0.0, 4.0, 3.0).is_err()); // bars not in the set
    }

    #[test]
    fn test_loop_window_timing() {
        // 2 bars over 4 seconds = 120 BPM, 32 base cells of 0.125s
        let window = LoopWindow::new(1.0, 5.0, 2.0).unwrap();
        assert_eq!(window.duration_seconds(), 4.0);
        assert_eq!(window.base_step_count(), 32);
        assert_eq!(window.implied_tempo().bpm(), 120.0);
        assert_eq!(window.base_step_duration(), 0.125);
    }

    #[test]
    fn test_fractional_bar_window() {
        let window = LoopWindow::new(0.0, 0.5, 0.25).unwrap();
        assert_eq!(window.base_step_count(), 4);
    }

    #[test]
    fn test_loop_window_deserialization_is_validated() {
        // Degenerate regions are rejected on the JSON path too
        let bad = r#"{"start_sec":5.0,"end_sec":4.0,"bars":2.0}"#;
        assert!(serde_json::from_str::<LoopWindow>(bad).is_err());

        let good = r#"{"start_sec":1.0,"end_sec":5.0,"bars":2.0}"#;
        let window: LoopWindow = serde_json::from_str(good).unwrap();
        assert_eq!(window.start_sec(), 1.0);
        assert_eq!(window.end_sec(), 5.0);
        assert_eq!(window.bars(), 2.0);
    }
}
