// Step resolution - Turns a pattern position into a concrete trigger
// Shared by the real-time transport and the offline renderer

use crate::sequencer::roles::RoleResolver;
use crate::sequencer::step::{Pattern, StepEvent};

/// A fully resolved step: what plays, how many times, how loud
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTrigger {
    pub slice_index: usize,
    pub retrig: u8,
    pub gain: f32,
}

/// Whether a resolution is actually sounded or merely shown
///
/// Only sounded resolutions rotate role pools and feed the hold overrides;
/// previews are idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    Sounding,
    Preview,
}

/// Everything the resolver needs to place one step
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    /// The active pattern (main, or the fill while one is in progress)
    pub pattern: &'a Pattern,
    /// Position on the base sixteenth grid; for fills this is the
    /// bar-relative elapsed position (0..16)
    pub base_step: u64,
    /// Fill anchor in base steps (0 when a main pattern is active)
    pub anchor: u64,
    /// Loop span on the base grid, for slice-index wrapping
    pub total_base_steps: u64,
}

/// Split a step into its retrig sub-intervals
///
/// A retrig count of N tiles the step with N equal `(offset, duration)`
/// sub-intervals, summing to the full step with no gap or overlap.
pub fn sub_step_intervals(step_duration: f64, retrig: u8) -> impl Iterator<Item = (f64, f64)> {
    let n = retrig.max(1) as usize;
    let sub = step_duration / n as f64;
    (0..n).map(move |k| (k as f64 * sub, sub))
}

/// Resolves steps against a pattern, applying role rotation and the live
/// performance overrides (repeat-hold, reverse-hold)
#[derive(Debug, Clone)]
pub struct StepResolver {
    roles: RoleResolver,
    repeat_hold: bool,
    reverse_hold: bool,
    /// Base-grid position the reverse scrub reads next
    reverse_cursor: Option<u64>,
    /// Slice index that most recently actually sounded
    last_sounded: Option<usize>,
}

impl StepResolver {
    pub fn new(roles: RoleResolver) -> Self {
        Self {
            roles,
            repeat_hold: false,
            reverse_hold: false,
            reverse_cursor: None,
            last_sounded: None,
        }
    }

    pub fn roles(&self) -> &RoleResolver {
        &self.roles
    }

    /// Engage or release repeat-hold
    ///
    /// While engaged, every new trigger is overridden to whatever slice most
    /// recently sounded, freezing the rhythmic grid onto one cell.
    pub fn set_repeat_hold(&mut self, engaged: bool) {
        self.repeat_hold = engaged;
    }

    /// Engage or release reverse-hold
    ///
    /// While engaged, the first trigger replays the last sounding slice and
    /// each subsequent trigger steps one base-grid position backward,
    /// wrapping within the loop.
    pub fn set_reverse_hold(&mut self, engaged: bool) {
        self.reverse_hold = engaged;
        if !engaged {
            self.reverse_cursor = None;
        }
    }

    pub fn repeat_hold(&self) -> bool {
        self.repeat_hold
    }

    pub fn reverse_hold(&self) -> bool {
        self.reverse_hold
    }

    /// Drop hold state and trigger history (playback stopped)
    pub fn clear_performance_state(&mut self) {
        self.repeat_hold = false;
        self.reverse_hold = false;
        self.reverse_cursor = None;
        self.last_sounded = None;
    }

    /// Resolve one step into a trigger, or `None` for silence
    pub fn resolve(
        &mut self,
        req: ResolveRequest<'_>,
        mode: ResolveMode,
    ) -> Option<ResolvedTrigger> {
        let sounding = mode == ResolveMode::Sounding;

        // Live overrides intercept before the pattern is consulted. A hold
        // with nothing sounded yet falls through to normal lookup.
        if self.reverse_hold {
            if let Some(trigger) = self.resolve_reverse(req, sounding) {
                return Some(trigger);
            }
        } else if self.repeat_hold {
            if let Some(slice_index) = self.last_sounded {
                let (retrig, gain) = event_shape(req.pattern.event_at(req.base_step));
                return Some(ResolvedTrigger {
                    slice_index,
                    retrig,
                    gain,
                });
            }
        }

        let event = req.pattern.event_at(req.base_step);
        let trigger = match event {
            StepEvent::Rest => return None,
            StepEvent::Slice {
                index,
                retrig,
                gain,
            } => {
                let slice_index = self.apply_anchor(index, req);
                ResolvedTrigger {
                    slice_index,
                    retrig,
                    gain,
                }
            }
            StepEvent::Role { role, retrig, gain } => {
                // An empty pool degrades to silence, never an error
                let slice_index = if sounding {
                    self.roles.take(role)?
                } else {
                    self.roles.peek(role)?
                };
                ResolvedTrigger {
                    slice_index,
                    retrig,
                    gain,
                }
            }
        };

        if sounding {
            self.last_sounded = Some(trigger.slice_index);
        }
        Some(trigger)
    }

    /// Fill slice indices are bar-relative; re-base them onto the physical
    /// bar the fill landed on and wrap within the loop
    fn apply_anchor(&self, index: usize, req: ResolveRequest<'_>) -> usize {
        if req.anchor == 0 || req.total_base_steps == 0 {
            return index;
        }
        ((index as u64 + req.anchor) % req.total_base_steps) as usize
    }

    fn resolve_reverse(
        &mut self,
        req: ResolveRequest<'_>,
        sounding: bool,
    ) -> Option<ResolvedTrigger> {
        let total = req.total_base_steps.max(1);
        let next = match self.reverse_cursor {
            // First trigger of the hold: freeze on the last sounding slice
            None => self.last_sounded? as u64 % total,
            // Then scrub backward one base cell per trigger
            Some(cursor) => (cursor + total - 1) % total,
        };
        if sounding {
            self.reverse_cursor = Some(next);
            self.last_sounded = Some(next as usize);
        }
        let (retrig, gain) = event_shape(req.pattern.event_at(req.base_step));
        Some(ResolvedTrigger {
            slice_index: next as usize,
            retrig,
            gain,
        })
    }
}

/// Retrig/gain shape of an event, with neutral values for rests so a hold
/// can still sound over a silent cell
fn event_shape(event: StepEvent) -> (u8, f32) {
    match event {
        StepEvent::Rest => (1, 1.0),
        StepEvent::Slice { retrig, gain, .. } | StepEvent::Role { retrig, gain, .. } => {
            (retrig, gain)
        }
    }
}
