// Voice - Per-trigger slice playback with sustain looping and declick fade

use crate::audio::slices::{SliceCell, SourceBuffer};

/// Frames of linear fade at the tail of a fading trigger
const FADE_FRAMES: usize = 256;

/// One playing trigger
///
/// Walks the source from the cell offset for the trigger's duration. If the
/// trigger outlasts the cell content, playback keeps looping inside the
/// cell's sustain window, or over the whole cell when it has none, so a
/// slow tempo or a long retrig never leaves dead air.
#[derive(Debug, Clone)]
pub struct SliceVoice {
    cell: SliceCell,
    gain: f32,
    fade_out: bool,
    /// Total frames this trigger lasts
    duration_frames: usize,
    /// Frames rendered so far
    rendered: usize,
    /// Read position relative to the cell offset
    position: usize,
}

impl SliceVoice {
    pub fn new(cell: SliceCell, duration_frames: usize, gain: f32, fade_out: bool) -> Self {
        Self {
            cell,
            gain,
            fade_out,
            duration_frames,
            rendered: 0,
            position: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.rendered < self.duration_frames
    }

    pub fn stop(&mut self) {
        self.rendered = self.duration_frames;
    }

    /// Render one sample and advance
    pub fn next_sample(&mut self, source: &SourceBuffer) -> f32 {
        if !self.is_active() {
            return 0.0;
        }

        let mut frame = self.cell.offset + self.position;
        if self.position >= self.cell.frames && self.cell.frames > 0 {
            let past = self.position - self.cell.frames;
            frame = match self.cell.sustain {
                Some(sustain) if sustain.end > sustain.start => {
                    sustain.start + past % (sustain.end - sustain.start)
                }
                // No tail window: keep cycling the whole cell
                _ => self.cell.offset + past % self.cell.frames,
            };
        }

        let sample = source.samples.get(frame).copied().unwrap_or(0.0);
        let mut amp = self.gain;
        if self.fade_out {
            let fade = FADE_FRAMES.min(self.duration_frames);
            let remaining = self.duration_frames - self.rendered;
            if remaining < fade {
                amp *= remaining as f32 / fade as f32;
            }
        }

        self.rendered += 1;
        self.position += 1;
        sample * amp
    }
}
