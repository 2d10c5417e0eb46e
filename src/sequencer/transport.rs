// Transport - Look-ahead step scheduler with boundary-aligned mutations
//
// Two clocks drive playback: the device clock owned by the sink, and a
// coarse control loop that calls `tick` every TICK_INTERVAL_MS. Each tick
// schedules every step whose device time falls inside the look-ahead
// horizon, so timing accuracy comes from the device clock alone and the
// control loop only has to stay roughly on schedule.
//
// All live mutations are requested, never applied directly: each category
// has a single pending slot, and the scheduler applies whatever is in the
// slot when the step it aligns to comes up. Tempo applies at the very next
// step, loop and resolution at the next bar line, main and fill at the
// next phrase line, and an active fill defers main and resolution changes
// until it completes.

use crate::audio::sink::{AudioSink, ScheduledTrigger};
use crate::messaging::progress::SharedProgress;
use crate::sequencer::grid::{BASE_STEPS_PER_BAR, GridResolution, LoopWindow, Tempo};
use crate::sequencer::resolve::{
    ResolveMode, ResolveRequest, ResolvedTrigger, StepResolver, sub_step_intervals,
};
use crate::sequencer::roles::RoleResolver;
use crate::sequencer::step::{Pattern, PatternBank, PatternId, PatternKind};
use crate::sequencer::{TransportError, TransportResult};

/// How far past "now" each tick schedules
pub const LOOKAHEAD_SECONDS: f64 = 0.2;

/// Control-loop period; must stay well under the look-ahead
pub const TICK_INTERVAL_MS: u64 = 25;

/// Gap between `start` and the first step, so the first triggers are never
/// already in the past when the sink sees them
const START_DELAY_SECONDS: f64 = 0.05;

/// One pending slot per mutation category; a new request replaces the old
#[derive(Debug, Clone, Default)]
pub struct PendingMutations {
    loop_window: Option<LoopWindow>,
    main: Option<Pattern>,
    fill: Option<Pattern>,
    tempo: Option<Tempo>,
    resolution: Option<GridResolution>,
}

impl PendingMutations {
    pub fn is_empty(&self) -> bool {
        self.loop_window.is_none()
            && self.main.is_none()
            && self.fill.is_none()
            && self.tempo.is_none()
            && self.resolution.is_none()
    }
}

#[derive(Debug, Clone)]
enum FillState {
    Idle,
    Active {
        start_step: u64,
        /// Base-grid offset of the bar the fill landed on
        anchor: u64,
        /// First step after the fill; captured at activation so a tempo
        /// change mid-fill never stretches the bar count
        end_step: u64,
        pattern: Pattern,
    },
}

/// Everything that exists only while playing
#[derive(Debug, Clone)]
struct Schedule {
    /// Device time of step 0; the single timing anchor. Every step's time
    /// is `origin + step * step_duration`, never accumulated.
    origin: f64,
    step_duration: f64,
    tempo: Tempo,
    /// Whether tempo was set explicitly or follows the window's natural rate
    tempo_override: bool,
    resolution: GridResolution,
    window: LoopWindow,
    total_base_steps: u64,
    /// Next step not yet handed to the sink
    next_step: u64,
    main: Pattern,
    fill: FillState,
}

impl Schedule {
    fn step_time(&self, step: u64) -> f64 {
        self.origin + step as f64 * self.step_duration
    }

    fn steps_per_bar(&self) -> u64 {
        self.resolution.steps_per_bar() as u64
    }

    /// Apply whatever pending mutations are due at `next_step`
    fn apply_due(&mut self, pending: &mut PendingMutations) {
        let s = self.next_step;

        let mut fill_boundary = false;
        if let FillState::Active { end_step, .. } = self.fill {
            if s >= end_step {
                self.fill = FillState::Idle;
                fill_boundary = true;
            }
        }
        let fill_active = matches!(self.fill, FillState::Active { .. });

        let spb = self.steps_per_bar();
        let bar_line = s % spb == 0;
        // Bars elapsed is preserved across resolution rebasing, so phrase
        // parity can be decided up front
        let phrase_line = bar_line && (s / spb) % 2 == 0;

        if bar_line {
            if let Some(window) = pending.loop_window.take() {
                let boundary = self.step_time(s);
                self.window = window;
                self.total_base_steps = window.base_step_count();
                if !self.tempo_override {
                    self.tempo = window.implied_tempo();
                    self.step_duration = self.tempo.step_duration_seconds(self.resolution);
                    self.origin = boundary - s as f64 * self.step_duration;
                }
            }
            if !fill_active {
                if let Some(resolution) = pending.resolution.take() {
                    let boundary = self.step_time(s);
                    let bars_elapsed = s / spb;
                    self.resolution = resolution;
                    self.step_duration = self.tempo.step_duration_seconds(resolution);
                    self.next_step = bars_elapsed * resolution.steps_per_bar() as u64;
                    self.origin = boundary - self.next_step as f64 * self.step_duration;
                }
            }
        }

        if let Some(tempo) = pending.tempo.take() {
            // Retime from the very next step: that step keeps the device
            // time it already had, everything after it moves
            let boundary = self.step_time(self.next_step);
            self.tempo = tempo;
            self.tempo_override = true;
            self.step_duration = tempo.step_duration_seconds(self.resolution);
            self.origin = boundary - self.next_step as f64 * self.step_duration;
        }

        if !fill_active && (phrase_line || fill_boundary) {
            if let Some(pattern) = pending.main.take() {
                self.main = pattern;
            }
            if let Some(pattern) = pending.fill.take() {
                let s = self.next_step;
                let spb = self.steps_per_bar();
                let parity = (s / spb) % 2;
                self.fill = FillState::Active {
                    start_step: s,
                    anchor: parity * BASE_STEPS_PER_BAR as u64,
                    end_step: s + spb,
                    pattern,
                };
            }
        }
    }

    /// The pattern, base-grid position and anchor that drive `step`
    fn step_frame(&self, step: u64) -> (&Pattern, u64, u64) {
        match &self.fill {
            FillState::Active {
                start_step,
                anchor,
                pattern,
                ..
            } if step >= *start_step => {
                (pattern, self.resolution.to_base_step(step - start_step), *anchor)
            }
            _ => (&self.main, self.resolution.to_base_step(step), 0),
        }
    }
}

/// The re-sequencing transport
///
/// Owns the pattern bank, the step resolver and the sink. Single-threaded
/// by construction: callers either drive it directly or through
/// [`crate::sequencer::LoopPlayer`], which runs it on its own thread.
pub struct Transport<S: AudioSink> {
    sink: S,
    bank: PatternBank,
    resolver: StepResolver,
    start_window: LoopWindow,
    start_tempo: Option<Tempo>,
    start_resolution: GridResolution,
    schedule: Option<Schedule>,
    pending: PendingMutations,
    /// Triggers handed to the sink whose audio has not finished yet
    in_flight: Vec<ScheduledTrigger>,
    progress: SharedProgress,
    lookahead: f64,
    /// Short fade-out at the end of every trigger to kill boundary clicks
    gapless: bool,
}

impl<S: AudioSink> Transport<S> {
    pub fn new(sink: S, bank: PatternBank, roles: RoleResolver, window: LoopWindow) -> Self {
        Self {
            sink,
            bank,
            resolver: StepResolver::new(roles),
            start_window: window,
            start_tempo: None,
            start_resolution: GridResolution::default(),
            schedule: None,
            pending: PendingMutations::default(),
            in_flight: Vec::new(),
            progress: SharedProgress::new(),
            lookahead: LOOKAHEAD_SECONDS,
            gapless: true,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.schedule.is_some()
    }

    pub fn bank(&self) -> &PatternBank {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut PatternBank {
        &mut self.bank
    }

    pub fn resolver(&self) -> &StepResolver {
        &self.resolver
    }

    /// Handle observers can poll without touching this thread
    pub fn progress(&self) -> SharedProgress {
        self.progress.clone()
    }

    /// Begin playback from step 0 of the given main pattern
    ///
    /// Fails without side effects: a missing pattern or a dead clock
    /// leaves the transport exactly as it was.
    pub fn start(&mut self, main_id: PatternId) -> TransportResult<()> {
        let pattern = self
            .bank
            .get(main_id)
            .filter(|p| p.kind == PatternKind::Main)
            .cloned()
            .ok_or(TransportError::InvalidPattern(main_id))?;
        let now = self
            .sink
            .clock_time()
            .map_err(|e| TransportError::ClockUnavailable(e.to_string()))?;

        let tempo = self
            .start_tempo
            .unwrap_or_else(|| self.start_window.implied_tempo());
        let step_duration = tempo.step_duration_seconds(self.start_resolution);

        self.sink.cancel_all();
        self.in_flight.clear();
        self.pending = PendingMutations::default();
        self.schedule = Some(Schedule {
            origin: now + START_DELAY_SECONDS,
            step_duration,
            tempo,
            tempo_override: self.start_tempo.is_some(),
            resolution: self.start_resolution,
            window: self.start_window,
            total_base_steps: self.start_window.base_step_count(),
            next_step: 0,
            main: pattern,
            fill: FillState::Idle,
        });
        Ok(())
    }

    /// Stop playback and cut everything already scheduled
    pub fn stop(&mut self) {
        self.sink.cancel_all();
        self.in_flight.clear();
        self.schedule = None;
        self.pending = PendingMutations::default();
        self.resolver.clear_performance_state();
        self.progress.reset();
    }

    /// One pass of the control loop: apply due mutations, schedule every
    /// step inside the look-ahead horizon, publish progress
    pub fn tick(&mut self) -> TransportResult<()> {
        if self.schedule.is_none() {
            return Ok(());
        }
        let now = self
            .sink
            .clock_time()
            .map_err(|e| TransportError::ClockUnavailable(e.to_string()))?;
        self.in_flight.retain(|t| t.end_time() > now);

        let horizon = now + self.lookahead;
        if let Some(sched) = self.schedule.as_mut() {
            loop {
                sched.apply_due(&mut self.pending);
                if sched.step_time(sched.next_step) >= horizon {
                    break;
                }
                let step = sched.next_step;
                sched.next_step += 1;

                let step_time = sched.step_time(step);
                let (pattern, base_step, anchor) = sched.step_frame(step);
                let resolved = self.resolver.resolve(
                    ResolveRequest {
                        pattern,
                        base_step,
                        anchor,
                        total_base_steps: sched.total_base_steps,
                    },
                    ResolveMode::Sounding,
                );
                let Some(trigger) = resolved else { continue };

                for scheduled in
                    expand_retrigs(step_time, sched.step_duration, trigger, self.gapless)
                {
                    match self.sink.schedule(scheduled) {
                        Ok(()) => self.in_flight.push(scheduled),
                        Err(e) => {
                            // A dropped trigger is one lost step, not a
                            // reason to halt the transport
                            eprintln!("Trigger dropped at step {}: {}", step, e);
                        }
                    }
                }
            }
        }

        self.publish_progress(now);
        Ok(())
    }

    /// Swap the loop window at the next bar line
    pub fn request_loop(&mut self, window: LoopWindow) {
        if self.is_playing() {
            self.pending.loop_window = Some(window);
        } else {
            self.start_window = window;
        }
    }

    /// Swap the main pattern at the next phrase line (or when the active
    /// fill completes)
    pub fn request_main(&mut self, id: PatternId) -> TransportResult<()> {
        let pattern = self
            .bank
            .get(id)
            .filter(|p| p.kind == PatternKind::Main)
            .cloned()
            .ok_or(TransportError::InvalidPattern(id))?;
        // Stopped: nothing to align to, the next start names its own pattern
        if self.is_playing() {
            self.pending.main = Some(pattern);
        }
        Ok(())
    }

    /// Queue a one-bar fill for the next phrase line; while a fill is
    /// already sounding the new one chains at its end
    pub fn request_fill(&mut self, id: PatternId) -> TransportResult<()> {
        let pattern = self
            .bank
            .get(id)
            .filter(|p| p.kind == PatternKind::Fill)
            .cloned()
            .ok_or(TransportError::InvalidPattern(id))?;
        if self.is_playing() {
            self.pending.fill = Some(pattern);
        }
        Ok(())
    }

    /// Retime the grid from the very next step, keeping phase
    pub fn request_tempo(&mut self, bpm: f64) -> TransportResult<()> {
        if !(20.0..=999.0).contains(&bpm) {
            return Err(TransportError::InvalidTempo(bpm));
        }
        let tempo = Tempo::new(bpm);
        if self.is_playing() {
            self.pending.tempo = Some(tempo);
        } else {
            self.start_tempo = Some(tempo);
        }
        Ok(())
    }

    /// Change steps-per-bar at the next bar line
    pub fn request_resolution(&mut self, steps_per_bar: u32) -> TransportResult<()> {
        let resolution = GridResolution::new(steps_per_bar)?;
        if self.is_playing() {
            self.pending.resolution = Some(resolution);
        } else {
            self.start_resolution = resolution;
        }
        Ok(())
    }

    /// Repeat-hold takes effect on the next resolved step, no alignment
    pub fn set_repeat_hold(&mut self, engaged: bool) {
        self.resolver.set_repeat_hold(engaged);
    }

    pub fn set_reverse_hold(&mut self, engaged: bool) {
        self.resolver.set_reverse_hold(engaged);
    }

    /// Toggle the declick fade; affects triggers not yet scheduled
    pub fn set_gapless(&mut self, enabled: bool) {
        self.gapless = enabled;
    }

    /// Clone of the resolver for an offline bounce of the current state
    pub fn resolver_snapshot(&self) -> StepResolver {
        self.resolver.clone()
    }

    fn publish_progress(&self, now: f64) {
        let Some(sched) = self.schedule.as_ref() else {
            return;
        };
        let pos = ((now - sched.origin) / sched.step_duration).max(0.0);
        let steps_per_phrase = sched.resolution.steps_per_phrase() as f64;
        let phrase_fraction = ((pos % steps_per_phrase) / steps_per_phrase) as f32;
        let last_slice = self
            .in_flight
            .iter()
            .filter(|t| t.start_time <= now)
            .max_by(|a, b| a.start_time.total_cmp(&b.start_time))
            .map(|t| t.slice_index);
        self.progress.publish(pos as u64, last_slice, phrase_fraction);
    }
}

/// Split a resolved step into its sink triggers; in gapless mode every
/// sub-interval gets a short fade-out so adjacent triggers never click
fn expand_retrigs(
    step_time: f64,
    step_duration: f64,
    trigger: ResolvedTrigger,
    fade_out: bool,
) -> impl Iterator<Item = ScheduledTrigger> {
    sub_step_intervals(step_duration, trigger.retrig).map(move |(offset, duration)| {
        ScheduledTrigger {
            start_time: step_time + offset,
            duration,
            slice_index: trigger.slice_index,
            gain: trigger.gain,
            fade_out,
        }
    })
}
