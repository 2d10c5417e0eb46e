// Step events and patterns - Declarative slice sequences
// A pattern is an ordered list of step events against the 16-step base grid

use crate::sequencer::grid::BASE_STEPS_PER_BAR;
use crate::sequencer::roles::{ROLE_MARKER_BASE, SliceRole};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Unique identifier for patterns
pub type PatternId = u64;

fn default_retrig() -> u8 {
    1
}

fn default_gain() -> f32 {
    1.0
}

/// One cell of a pattern
///
/// Exactly one of three things: silence, a concrete slice, or a role marker
/// resolved to a concrete slice at trigger time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StepEvent {
    /// No trigger on this step
    Rest,
    /// Play a concrete slice
    Slice {
        index: usize,
        #[serde(default = "default_retrig")]
        retrig: u8,
        #[serde(default = "default_gain")]
        gain: f32,
    },
    /// Play whatever the role's pool hands out at trigger time
    Role {
        role: SliceRole,
        #[serde(default = "default_retrig")]
        retrig: u8,
        #[serde(default = "default_gain")]
        gain: f32,
    },
}

impl StepEvent {
    /// Shorthand for a plain slice hit (no retrig, full gain)
    pub fn slice(index: usize) -> Self {
        StepEvent::Slice {
            index,
            retrig: 1,
            gain: 1.0,
        }
    }

    /// Shorthand for a plain role hit
    pub fn role(role: SliceRole) -> Self {
        StepEvent::Role {
            role,
            retrig: 1,
            gain: 1.0,
        }
    }

    /// Build from the flat numeric representation used by pattern packs
    ///
    /// Indices in the role-marker band become `Role`; anything below it is a
    /// concrete `Slice`.
    pub fn from_raw(index: usize, retrig: u8, gain: f32) -> Self {
        let retrig = retrig.max(1);
        let gain = gain.clamp(0.0, 1.0);
        match SliceRole::from_marker_index(index) {
            Some(role) => StepEvent::Role { role, retrig, gain },
            None if index < ROLE_MARKER_BASE => StepEvent::Slice {
                index,
                retrig,
                gain,
            },
            // Above the band but not a known role: treat as silence
            None => StepEvent::Rest,
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, StepEvent::Rest)
    }
}

/// Whether a pattern drives the whole loop or a one-bar fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternKind {
    /// Pre-expanded to the loop's full span (bars * 16 entries)
    Main,
    /// Exactly 16 bar-relative entries, anchored to a physical bar when taken
    Fill,
}

/// A named, immutable sequence of step events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub name: String,
    pub kind: PatternKind,
    steps: Vec<StepEvent>,
}

impl Pattern {
    /// Create a main pattern; length must be a whole number of base bars
    pub fn main(id: PatternId, name: impl Into<String>, steps: Vec<StepEvent>) -> Self {
        assert!(
            !steps.is_empty() && steps.len() % BASE_STEPS_PER_BAR as usize == 0,
            "Main pattern length must be a multiple of {}",
            BASE_STEPS_PER_BAR
        );
        Self {
            id,
            name: name.into(),
            kind: PatternKind::Main,
            steps,
        }
    }

    /// Create a fill pattern; always exactly one base bar of offsets
    pub fn fill(id: PatternId, name: impl Into<String>, steps: Vec<StepEvent>) -> Self {
        assert!(
            steps.len() == BASE_STEPS_PER_BAR as usize,
            "Fill pattern must hold exactly {} entries",
            BASE_STEPS_PER_BAR
        );
        Self {
            id,
            name: name.into(),
            kind: PatternKind::Fill,
            steps,
        }
    }

    pub fn steps(&self) -> &[StepEvent] {
        &self.steps
    }

    /// Pattern span in base steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Look up the event at a base-grid position, repeating periodically
    /// when the position runs past the pattern's own span
    pub fn event_at(&self, base_step: u64) -> StepEvent {
        self.steps[(base_step % self.steps.len() as u64) as usize]
    }

    /// Span of the pattern in bars
    pub fn bars(&self) -> u32 {
        (self.steps.len() as u32).div_ceil(BASE_STEPS_PER_BAR)
    }

    /// Length check for patterns that arrived outside the constructors,
    /// i.e. deserialized from a pack file
    pub fn validate(&self) -> Result<(), String> {
        let len = self.steps.len();
        let ok = match self.kind {
            PatternKind::Main => len > 0 && len % BASE_STEPS_PER_BAR as usize == 0,
            PatternKind::Fill => len == BASE_STEPS_PER_BAR as usize,
        };
        if ok {
            Ok(())
        } else {
            Err(format!(
                "Pattern {} ({:?}) has invalid length {}",
                self.id, self.kind, len
            ))
        }
    }
}

/// Pattern store: named immutable patterns keyed by id
///
/// The authoring side is an external collaborator; packs arrive as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternBank {
    patterns: HashMap<PatternId, Pattern>,
}

impl PatternBank {
    /// Create an empty bank
    pub fn new() -> Self {
        Self {
            patterns: HashMap::new(),
        }
    }

    /// Add a pattern, replacing any previous pattern with the same id
    pub fn insert(&mut self, pattern: Pattern) {
        self.patterns.insert(pattern.id, pattern);
    }

    /// Get a pattern by id
    pub fn get(&self, id: PatternId) -> Option<&Pattern> {
        self.patterns.get(&id)
    }

    pub fn contains(&self, id: PatternId) -> bool {
        self.patterns.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Save bank to JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let json_str = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize pattern bank: {}", e))?;
        std::fs::write(path, json_str)
            .map_err(|e| format!("Failed to write pattern bank file: {}", e))?;
        Ok(())
    }

    /// Load bank from JSON file
    ///
    /// Serde bypasses the pattern constructors, so the length invariants
    /// are re-checked here; a malformed pack never reaches the scheduler.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let json_str = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read pattern bank file: {}", e))?;
        let bank: PatternBank = serde_json::from_str(&json_str)
            .map_err(|e| format!("Failed to parse pattern bank: {}", e))?;
        for pattern in bank.patterns.values() {
            pattern
                .validate()
                .map_err(|e| format!("Rejected pattern bank: {}", e))?;
        }
        Ok(bank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_main(id: PatternId, bars: usize) -> Pattern {
        let steps = (0..bars * 16).map(StepEvent::slice).collect();
        Pattern::main(id, format!("main-{}", id), steps)
    }

    #[test]
    fn test_step_event_from_raw() {
        assert_eq!(StepEvent::from_raw(3, 1, 1.0), StepEvent::slice(3));
        assert_eq!(
            StepEvent::from_raw(ROLE_MARKER_BASE, 1, 1.0),
            StepEvent::role(SliceRole::PercussiveLow)
        );
        // Unknown marker above the band collapses to a rest
        assert_eq!(
            StepEvent::from_raw(ROLE_MARKER_BASE + 99, 1, 1.0),
            StepEvent::Rest
        );
    }

    #[test]
    fn test_from_raw_clamps() {
        // Retrig of zero is meaningless; gain is clamped to 0..1
        match StepEvent::from_raw(2, 0, 1.5) {
            StepEvent::Slice { retrig, gain, .. } => {
                assert_eq!(retrig, 1);
                assert_eq!(gain, 1.0);
            }
            other => panic!("expected Slice, got {:?}", other),
        }
    }

    #[test]
    fn test_main_pattern_wraps_periodically() {
        let pattern = flat_main(1, 1);
        assert_eq!(pattern.len(), 16);
        assert_eq!(pattern.event_at(0), StepEvent::slice(0));
        // Position 16 maps back onto position 0
        assert_eq!(pattern.event_at(16), StepEvent::slice(0));
        assert_eq!(pattern.event_at(19), StepEvent::slice(3));
    }

    #[test]
    #[should_panic(expected = "multiple of 16")]
    fn test_main_pattern_rejects_partial_bar() {
        let _ = Pattern::main(1, "bad", vec![StepEvent::Rest; 10]);
    }

    #[test]
    #[should_panic(expected = "exactly 16")]
    fn test_fill_pattern_rejects_wrong_length() {
        let _ = Pattern::fill(1, "bad", vec![StepEvent::Rest; 32]);
    }

    #[test]
    fn test_bank_insert_and_lookup() {
        let mut bank = PatternBank::new();
        bank.insert(flat_main(1, 2));
        bank.insert(Pattern::fill(2, "fill", vec![StepEvent::Rest; 16]));

        assert_eq!(bank.len(), 2);
        assert!(bank.contains(1));
        assert_eq!(bank.get(1).unwrap().bars(), 2);
        assert_eq!(bank.get(2).unwrap().kind, PatternKind::Fill);
        assert!(bank.get(3).is_none());
    }

    #[test]
    fn test_bank_insert_replaces() {
        let mut bank = PatternBank::new();
        bank.insert(flat_main(1, 1));
        bank.insert(flat_main(1, 4));
        assert_eq!(bank.len(), 1);
        assert_eq!(bank.get(1).unwrap().bars(), 4);
    }

    #[test]
    fn test_load_rejects_empty_main_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hollow.json");
        let json = r#"{"patterns":{"1":{"id":1,"name":"hollow","kind":"Main","steps":[]}}}"#;
        std::fs::write(&path, json).unwrap();

        let err = PatternBank::load_from_file(&path).unwrap_err();
        assert!(err.contains("invalid length 0"), "got: {}", err);
    }

    #[test]
    fn test_load_rejects_wrong_length_fill() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.json");
        let json = r#"{"patterns":{"9":{"id":9,"name":"short","kind":"Fill","steps":["Rest","Rest","Rest","Rest"]}}}"#;
        std::fs::write(&path, json).unwrap();

        let err = PatternBank::load_from_file(&path).unwrap_err();
        assert!(err.contains("invalid length 4"), "got: {}", err);
    }

    #[test]
    fn test_load_accepts_well_formed_bank() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.json");
        let mut bank = PatternBank::new();
        bank.insert(flat_main(1, 2));
        bank.insert(Pattern::fill(2, "fill", vec![StepEvent::Rest; 16]));
        bank.save_to_file(&path).unwrap();

        let loaded = PatternBank::load_from_file(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(1).unwrap().bars(), 2);
    }

    #[test]
    fn test_bank_json_round_trip() {
        let mut bank = PatternBank::new();
        bank.insert(Pattern::main(
            7,
            "mixed",
            vec![
                StepEvent::slice(0),
                StepEvent::Rest,
                StepEvent::role(SliceRole::PercussiveMid),
                StepEvent::Slice {
                    index: 4,
                    retrig: 3,
                    gain: 0.5,
                },
            ]
            .into_iter()
            .cycle()
            .take(16)
            .collect(),
        ));

        let json = serde_json::to_string(&bank).unwrap();
        let loaded: PatternBank = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(7).unwrap().steps(), bank.get(7).unwrap().steps());
    }
}
