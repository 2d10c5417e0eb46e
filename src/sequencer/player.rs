// Player - Dedicated control thread driving the transport
//
// The transport itself is single-threaded; this wraps it in a thread that
// drains the command ring, ticks, and sleeps. The sink is built inside the
// thread because device streams are not Send on every platform.

use crate::audio::sink::AudioSink;
use crate::messaging::channels::{CommandProducer, create_command_channel};
use crate::messaging::command::TransportCommand;
use crate::messaging::progress::{PlaybackProgress, SharedProgress};
use crate::sequencer::step::PatternId;
use crate::sequencer::transport::{TICK_INTERVAL_MS, Transport};
use crate::sequencer::{LoopWindow, TransportResult};
use ringbuf::traits::{Consumer, Producer};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct LoopPlayer {
    command_tx: CommandProducer,
    progress: SharedProgress,
    handle: Option<JoinHandle<()>>,
}

impl LoopPlayer {
    /// Spawn the control thread; `build` runs on that thread and failures
    /// surface here before any command can be sent
    pub fn spawn<S, F>(build: F) -> Result<Self, String>
    where
        S: AudioSink,
        F: FnOnce() -> TransportResult<Transport<S>> + Send + 'static,
    {
        let (command_tx, mut command_rx) = create_command_channel(256);
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);

        let handle = thread::spawn(move || {
            let mut transport = match build() {
                Ok(transport) => {
                    let _ = ready_tx.send(Ok(transport.progress()));
                    transport
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };

            loop {
                let mut shutdown = false;
                while let Some(command) = command_rx.try_pop() {
                    match command {
                        TransportCommand::Start(id) => {
                            if let Err(e) = transport.start(id) {
                                eprintln!("Start failed: {}", e);
                            }
                        }
                        TransportCommand::Stop => transport.stop(),
                        TransportCommand::RequestLoop(window) => transport.request_loop(window),
                        TransportCommand::RequestMain(id) => {
                            if let Err(e) = transport.request_main(id) {
                                eprintln!("Main change rejected: {}", e);
                            }
                        }
                        TransportCommand::RequestFill(id) => {
                            if let Err(e) = transport.request_fill(id) {
                                eprintln!("Fill rejected: {}", e);
                            }
                        }
                        TransportCommand::RequestTempo(bpm) => {
                            if let Err(e) = transport.request_tempo(bpm) {
                                eprintln!("Tempo rejected: {}", e);
                            }
                        }
                        TransportCommand::RequestResolution(steps) => {
                            if let Err(e) = transport.request_resolution(steps) {
                                eprintln!("Resolution rejected: {}", e);
                            }
                        }
                        TransportCommand::RepeatHold(engaged) => {
                            transport.set_repeat_hold(engaged)
                        }
                        TransportCommand::ReverseHold(engaged) => {
                            transport.set_reverse_hold(engaged)
                        }
                        TransportCommand::SetGapless(enabled) => {
                            transport.set_gapless(enabled)
                        }
                        TransportCommand::Shutdown => shutdown = true,
                    }
                }
                if shutdown {
                    transport.stop();
                    break;
                }
                if let Err(e) = transport.tick() {
                    // A dead clock means nothing can be timed any more
                    eprintln!("Transport halted: {}", e);
                    transport.stop();
                }
                thread::sleep(Duration::from_millis(TICK_INTERVAL_MS));
            }
        });

        match ready_rx.recv() {
            Ok(Ok(progress)) => Ok(Self {
                command_tx,
                progress,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err("Transport thread died during startup".to_string()),
        }
    }

    fn send(&mut self, command: TransportCommand) {
        if self.command_tx.try_push(command).is_err() {
            eprintln!("Transport command dropped: channel full");
        }
    }

    pub fn start(&mut self, id: PatternId) {
        self.send(TransportCommand::Start(id));
    }

    pub fn stop(&mut self) {
        self.send(TransportCommand::Stop);
    }

    pub fn request_loop(&mut self, window: LoopWindow) {
        self.send(TransportCommand::RequestLoop(window));
    }

    pub fn request_main(&mut self, id: PatternId) {
        self.send(TransportCommand::RequestMain(id));
    }

    pub fn request_fill(&mut self, id: PatternId) {
        self.send(TransportCommand::RequestFill(id));
    }

    pub fn request_tempo(&mut self, bpm: f64) {
        self.send(TransportCommand::RequestTempo(bpm));
    }

    pub fn request_resolution(&mut self, steps_per_bar: u32) {
        self.send(TransportCommand::RequestResolution(steps_per_bar));
    }

    pub fn set_repeat_hold(&mut self, engaged: bool) {
        self.send(TransportCommand::RepeatHold(engaged));
    }

    pub fn set_reverse_hold(&mut self, engaged: bool) {
        self.send(TransportCommand::ReverseHold(engaged));
    }

    pub fn set_gapless(&mut self, enabled: bool) {
        self.send(TransportCommand::SetGapless(enabled));
    }

    pub fn progress(&self) -> PlaybackProgress {
        self.progress.snapshot()
    }

    pub fn shutdown(mut self) {
        self.send(TransportCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LoopPlayer {
    fn drop(&mut self) {
        let _ = self.command_tx.try_push(TransportCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
