// Roles - Abstract step markers resolved to concrete slices
// A role marker ("a kick-like cell") is resolved at trigger time from a
// rotating candidate pool so repeated pattern positions vary

use std::fmt;

/// First numeric index of the role-marker band
///
/// Pattern packs authored against the flat representation keep concrete
/// slice indices below this value and role markers at or above it.
pub const ROLE_MARKER_BASE: usize = 1000;

/// The four abstract slice roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SliceRole {
    /// Kick-like cells: low-band transient energy
    PercussiveLow,
    /// Snare-like cells: mid-band transient energy
    PercussiveMid,
    /// Hat/cymbal-like cells: high-band transients
    HighTransient,
    /// Ghost-note material: low overall energy
    LowEnergy,
}

impl SliceRole {
    /// All roles, in marker-band order
    pub const ALL: [SliceRole; 4] = [
        SliceRole::PercussiveLow,
        SliceRole::PercussiveMid,
        SliceRole::HighTransient,
        SliceRole::LowEnergy,
    ];

    /// The flat marker index for this role
    pub fn marker_index(&self) -> usize {
        ROLE_MARKER_BASE
            + match self {
                SliceRole::PercussiveLow => 0,
                SliceRole::PercussiveMid => 1,
                SliceRole::HighTransient => 2,
                SliceRole::LowEnergy => 3,
            }
    }

    /// Map a flat marker index back to a role
    pub fn from_marker_index(index: usize) -> Option<Self> {
        match index.checked_sub(ROLE_MARKER_BASE)? {
            0 => Some(SliceRole::PercussiveLow),
            1 => Some(SliceRole::PercussiveMid),
            2 => Some(SliceRole::HighTransient),
            3 => Some(SliceRole::LowEnergy),
            _ => None,
        }
    }
}

impl fmt::Display for SliceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SliceRole::PercussiveLow => "perc-low",
            SliceRole::PercussiveMid => "perc-mid",
            SliceRole::HighTransient => "high-transient",
            SliceRole::LowEnergy => "low-energy",
        };
        write!(f, "{}", name)
    }
}

/// An ordered list of concrete slice candidates with a rotating cursor
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RolePool {
    candidates: Vec<usize>,
    #[serde(default)]
    cursor: usize,
}

impl RolePool {
    /// Create a pool from candidate slice indices
    pub fn new(candidates: Vec<usize>) -> Self {
        Self {
            candidates,
            cursor: 0,
        }
    }

    /// The slice the pool will hand out next, without rotating
    pub fn peek(&self) -> Option<usize> {
        if self.candidates.is_empty() {
            return None;
        }
        Some(self.candidates[self.cursor % self.candidates.len()])
    }

    /// Hand out the current slice and rotate to the next candidate
    pub fn take(&mut self) -> Option<usize> {
        let slice = self.peek()?;
        self.cursor = (self.cursor + 1) % self.candidates.len();
        Some(slice)
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Reset the rotation to the first candidate
    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}

/// Resolves role markers to concrete slices, one rotating pool per role
///
/// `peek` answers "what is shown now" (display/preview) and never rotates;
/// `take` answers "what plays next" and rotates, and is only called when a
/// trigger is actually sounded in real-time playback. That split keeps a
/// single source of truth between preview and playback.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RoleResolver {
    percussive_low: RolePool,
    percussive_mid: RolePool,
    high_transient: RolePool,
    low_energy: RolePool,
}

impl RoleResolver {
    /// Create a resolver with a pool for each role
    pub fn new(
        percussive_low: RolePool,
        percussive_mid: RolePool,
        high_transient: RolePool,
        low_energy: RolePool,
    ) -> Self {
        Self {
            percussive_low,
            percussive_mid,
            high_transient,
            low_energy,
        }
    }

    fn pool(&self, role: SliceRole) -> &RolePool {
        match role {
            SliceRole::PercussiveLow => &self.percussive_low,
            SliceRole::PercussiveMid => &self.percussive_mid,
            SliceRole::HighTransient => &self.high_transient,
            SliceRole::LowEnergy => &self.low_energy,
        }
    }

    fn pool_mut(&mut self, role: SliceRole) -> &mut RolePool {
        match role {
            SliceRole::PercussiveLow => &mut self.percussive_low,
            SliceRole::PercussiveMid => &mut self.percussive_mid,
            SliceRole::HighTransient => &mut self.high_transient,
            SliceRole::LowEnergy => &mut self.low_energy,
        }
    }

    /// Resolve a role without rotating (preview/display)
    pub fn peek(&self, role: SliceRole) -> Option<usize> {
        self.pool(role).peek()
    }

    /// Resolve a role and rotate its pool (a trigger was sounded)
    pub fn take(&mut self, role: SliceRole) -> Option<usize> {
        self.pool_mut(role).take()
    }

    /// Reset every pool's rotation
    pub fn reset(&mut self) {
        for role in SliceRole::ALL {
            self.pool_mut(role).reset();
        }
    }
}
