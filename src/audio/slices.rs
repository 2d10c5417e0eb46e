// Slices - Source audio and the equal-division slice table

use crate::sequencer::LoopWindow;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Decoded mono source audio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SourceBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Sustain window in absolute frames within the source
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SustainLoop {
    pub start: usize,
    pub end: usize,
}

/// One playable region of the source
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SliceCell {
    /// First frame in the source
    pub offset: usize,
    /// Frame count of the cell
    pub frames: usize,
    /// Optional loop window for triggers that outlast the cell
    pub sustain: Option<SustainLoop>,
}

/// The loop window cut into equal base-grid cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceTable {
    cells: Vec<SliceCell>,
}

impl SliceTable {
    /// Divide a loop window into its base sixteenth cells
    ///
    /// Cell boundaries are computed from the window edges, not cumulatively,
    /// so rounding never drifts across a long loop.
    pub fn from_window(buffer: &SourceBuffer, window: &LoopWindow) -> Self {
        let rate = buffer.sample_rate as f64;
        let start_frame = (window.start_sec() * rate).round() as usize;
        let end_frame = ((window.end_sec() * rate).round() as usize).min(buffer.samples.len());
        let count = window.base_step_count() as usize;
        let span = end_frame.saturating_sub(start_frame);

        let mut cells = Vec::with_capacity(count);
        for i in 0..count {
            let a = start_frame + span * i / count;
            let b = start_frame + span * (i + 1) / count;
            cells.push(SliceCell {
                offset: a,
                frames: b - a,
                sustain: None,
            });
        }
        Self { cells }
    }

    pub fn get(&self, index: usize) -> Option<&SliceCell> {
        self.cells.get(index)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn set_sustain_loop(&mut self, index: usize, sustain: SustainLoop) {
        if let Some(cell) = self.cells.get_mut(index) {
            cell.sustain = Some(sustain);
        }
    }

    /// Save the table to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let json_str = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize slice table: {}", e))?;
        std::fs::write(path, json_str)
            .map_err(|e| format!("Failed to write slice table file: {}", e))?;
        Ok(())
    }

    /// Load a table from a JSON file (the slicing step runs out of process)
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let json_str = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read slice table file: {}", e))?;
        serde_json::from_str(&json_str).map_err(|e| format!("Failed to parse slice table: {}", e))
    }
}
