// Engine - CPAL-backed sink with sample-accurate trigger activation
//
// The transport hands triggers over a lock-free ring; the callback activates
// each one on the exact frame its device time names. All processing is f32
// internally, converted to the device format (F32, I16 or U16) on write.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use std::sync::{Arc, Mutex};

use crate::audio::sink::{AudioSink, ScheduledTrigger};
use crate::audio::slices::{SliceTable, SourceBuffer};
use crate::audio::timing::DeviceClock;
use crate::audio::voice::SliceVoice;
use crate::audio::{SinkError, SinkResult};

/// Polyphony cap; the oldest voice is stolen when exceeded
const MAX_VOICES: usize = 32;

/// Trigger translated onto the device frame clock
#[derive(Debug, Clone, Copy)]
struct FrameTrigger {
    start_frame: u64,
    frames: usize,
    slice_index: usize,
    gain: f32,
    fade_out: bool,
}

enum SinkCommand {
    Schedule(FrameTrigger),
    CancelAll,
}

type SinkCommandProducer = ringbuf::HeapProd<SinkCommand>;
type SinkCommandConsumer = ringbuf::HeapCons<SinkCommand>;

/// Callback-owned playback state
struct PlaybackState {
    source: SourceBuffer,
    table: SliceTable,
    pending: Vec<FrameTrigger>,
    voices: Vec<SliceVoice>,
}

impl PlaybackState {
    fn activate_due(&mut self, frame: u64) {
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].start_frame <= frame {
                let trigger = self.pending.swap_remove(i);
                if let Some(cell) = self.table.get(trigger.slice_index) {
                    if self.voices.len() >= MAX_VOICES {
                        self.voices.remove(0);
                    }
                    self.voices.push(SliceVoice::new(
                        *cell,
                        trigger.frames,
                        trigger.gain,
                        trigger.fade_out,
                    ));
                }
            } else {
                i += 1;
            }
        }
    }

    fn mix(&mut self) -> f32 {
        let mut sum = 0.0;
        for voice in &mut self.voices {
            sum += voice.next_sample(&self.source);
        }
        self.voices.retain(|v| v.is_active());
        sum
    }
}

pub struct CpalSink {
    _device: Device,
    _stream: Stream,
    clock: DeviceClock,
    command_tx: SinkCommandProducer,
}

impl CpalSink {
    pub fn new(source: SourceBuffer, table: SliceTable) -> SinkResult<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(SinkError::NoDevice)?;

        println!(
            "Audio device: {}",
            device.name().unwrap_or("Unknown".to_string())
        );

        let supported_config = device
            .default_output_config()
            .map_err(|e| SinkError::StreamConfig(format!("default config: {}", e)))?;

        let sample_format = supported_config.sample_format();
        let sample_rate = supported_config.sample_rate().0;
        let channels = supported_config.channels() as usize;
        let config: StreamConfig = supported_config.into();

        let clock = DeviceClock::new(sample_rate);
        let clock_cb = clock.clone();

        let rb = HeapRb::<SinkCommand>::new(1024);
        let (command_tx, command_rx) = rb.split();
        let command_rx = Arc::new(Mutex::new(command_rx));

        let state = Arc::new(Mutex::new(PlaybackState {
            source,
            table,
            pending: Vec::with_capacity(256),
            voices: Vec::with_capacity(MAX_VOICES),
        }));

        let stream = match sample_format {
            SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config, channels, command_rx, state, clock_cb)
            }
            SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config, channels, command_rx, state, clock_cb)
            }
            SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config, channels, command_rx, state, clock_cb)
            }
            other => {
                return Err(SinkError::StreamConfig(format!(
                    "Unsupported sample format: {:?}. Supported formats: F32, I16, U16",
                    other
                )));
            }
        }?;

        stream
            .play()
            .map_err(|e| SinkError::StreamConfig(format!("stream start: {}", e)))?;

        println!("Audio sink started: {} Hz, {} channels", sample_rate, channels);

        Ok(Self {
            _device: device,
            _stream: stream,
            clock,
            command_tx,
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.clock.sample_rate()
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        channels: usize,
        command_rx: Arc<Mutex<SinkCommandConsumer>>,
        state: Arc<Mutex<PlaybackState>>,
        clock: DeviceClock,
    ) -> SinkResult<Stream>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // No allocations, no I/O, no blocking locks in here
                    let base_frame = clock.frame_position();

                    if let Ok(mut st) = state.try_lock() {
                        if let Ok(mut rx) = command_rx.try_lock() {
                            while let Some(cmd) = rx.try_pop() {
                                match cmd {
                                    SinkCommand::Schedule(trigger) => {
                                        if st.pending.len() < st.pending.capacity() {
                                            st.pending.push(trigger);
                                        }
                                    }
                                    SinkCommand::CancelAll => {
                                        st.pending.clear();
                                        st.voices.clear();
                                    }
                                }
                            }
                        }

                        for (i, frame) in data.chunks_mut(channels).enumerate() {
                            st.activate_due(base_frame + i as u64);
                            let sample = st.mix().clamp(-1.0, 1.0);
                            for channel_sample in frame.iter_mut() {
                                *channel_sample = Sample::from_sample::<f32>(sample);
                            }
                        }
                    } else {
                        // Could not take the lock: emit silence, never block
                        for sample in data.iter_mut() {
                            *sample = Sample::from_sample::<f32>(0.0);
                        }
                    }

                    clock.advance((data.len() / channels) as u64);
                },
                move |err| {
                    eprintln!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| SinkError::StreamConfig(format!("stream creation: {}", e)))?;

        Ok(stream)
    }
}

impl AudioSink for CpalSink {
    fn clock_time(&self) -> SinkResult<f64> {
        Ok(self.clock.now_seconds())
    }

    fn schedule(&mut self, trigger: ScheduledTrigger) -> SinkResult<()> {
        let frame_trigger = FrameTrigger {
            start_frame: self.clock.seconds_to_frames(trigger.start_time),
            frames: self.clock.seconds_to_frames(trigger.duration) as usize,
            slice_index: trigger.slice_index,
            gain: trigger.gain,
            fade_out: trigger.fade_out,
        };
        self.command_tx
            .try_push(SinkCommand::Schedule(frame_trigger))
            .map_err(|_| SinkError::Schedule("command ring full".to_string()))
    }

    fn cancel_all(&mut self) {
        if self.command_tx.try_push(SinkCommand::CancelAll).is_err() {
            eprintln!("Audio sink: cancel dropped, command ring full");
        }
    }
}
