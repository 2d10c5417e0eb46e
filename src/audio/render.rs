// Offline render - Deterministic bounce of a pattern to a buffer or WAV
//
// Runs the same step resolution the live transport uses, but against a
// private resolver clone and a closed-form timeline, so a bounce never
// perturbs live playback and two bounces of the same state are identical.

use crate::audio::slices::{SliceTable, SourceBuffer};
use crate::audio::voice::SliceVoice;
use crate::sequencer::resolve::{ResolveMode, ResolveRequest, StepResolver, sub_step_intervals};
use crate::sequencer::step::Pattern;
use crate::sequencer::{GridResolution, LoopWindow, Tempo};
use hound::{WavSpec, WavWriter};
use std::path::Path;

/// Output shape of a bounce. Audio is rendered at the source buffer's rate.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// 16 or 24
    pub bit_depth: u16,
    /// 1 = mono, 2 = the mono mix duplicated
    pub channels: u16,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            bit_depth: 16,
            channels: 2,
        }
    }
}

/// Everything a bounce needs, captured from the transport state
pub struct RenderJob {
    pub source: SourceBuffer,
    pub table: SliceTable,
    pub window: LoopWindow,
    pub pattern: Pattern,
    /// Cloned from the live transport so pool rotation stays untouched
    pub resolver: StepResolver,
    /// Override tempo; the window's natural rate when absent
    pub tempo: Option<Tempo>,
    pub resolution: GridResolution,
    /// Number of bars to bounce
    pub bars: u32,
    /// Declick fade at the tail of every trigger, as in live playback
    pub gapless: bool,
}

pub struct OfflineRenderer {
    settings: RenderSettings,
}

impl OfflineRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    /// Render the job to a mono f32 buffer at the source's sample rate
    pub fn render(&self, mut job: RenderJob) -> Result<Vec<f32>, String> {
        if job.bars == 0 {
            return Err("Render length must be at least one bar".to_string());
        }

        let tempo = job.tempo.unwrap_or_else(|| job.window.implied_tempo());
        let step_duration = tempo.step_duration_seconds(job.resolution);
        let total_steps = job.bars as u64 * job.resolution.steps_per_bar() as u64;
        let total_base_steps = job.window.base_step_count();
        let rate = job.source.sample_rate as f64;

        // One extra step of tail so the final triggers finish cleanly
        let total_frames =
            ((total_steps + 1) as f64 * step_duration * rate).ceil() as usize;
        let mut buffer = vec![0.0f32; total_frames];

        for step in 0..total_steps {
            let base_step = job.resolution.to_base_step(step);
            let trigger = match job.resolver.resolve(
                ResolveRequest {
                    pattern: &job.pattern,
                    base_step,
                    anchor: 0,
                    total_base_steps,
                },
                ResolveMode::Sounding,
            ) {
                Some(t) => t,
                None => continue,
            };

            let cell = match job.table.get(trigger.slice_index) {
                Some(cell) => *cell,
                None => continue,
            };

            let step_start = step as f64 * step_duration;
            for (offset, duration) in sub_step_intervals(step_duration, trigger.retrig) {
                let start_frame = ((step_start + offset) * rate).round() as usize;
                let frames = (duration * rate).round() as usize;
                let mut voice = SliceVoice::new(cell, frames, trigger.gain, job.gapless);
                for i in 0..frames {
                    let idx = start_frame + i;
                    if idx >= buffer.len() {
                        break;
                    }
                    buffer[idx] += voice.next_sample(&job.source);
                }
            }
        }

        Ok(buffer)
    }

    /// Render the job and write it out as an integer-PCM WAV
    pub fn render_to_wav(&self, path: impl AsRef<Path>, job: RenderJob) -> Result<Vec<f32>, String> {
        let sample_rate = job.source.sample_rate;
        let buffer = self.render(job)?;

        let spec = WavSpec {
            channels: self.settings.channels,
            sample_rate,
            bits_per_sample: self.settings.bit_depth,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path.as_ref(), spec)
            .map_err(|e| format!("Failed to create WAV file: {}", e))?;

        match self.settings.bit_depth {
            16 => {
                for &sample in &buffer {
                    let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    for _ in 0..self.settings.channels {
                        writer
                            .write_sample(value)
                            .map_err(|e| format!("Failed to write sample: {}", e))?;
                    }
                }
            }
            24 => {
                let scale = (1 << 23) as f32 - 1.0;
                for &sample in &buffer {
                    let value = (sample.clamp(-1.0, 1.0) * scale) as i32;
                    for _ in 0..self.settings.channels {
                        writer
                            .write_sample(value)
                            .map_err(|e| format!("Failed to write sample: {}", e))?;
                    }
                }
            }
            other => return Err(format!("Unsupported bit depth: {}", other)),
        }

        writer
            .finalize()
            .map_err(|e| format!("Failed to finalize WAV file: {}", e))?;

        println!(
            "Rendered {} frames at {} Hz to {}",
            buffer.len(),
            sample_rate,
            path.as_ref().display()
        );
        Ok(buffer)
    }
}
