// Progress - Wait-free playback position snapshot for observers

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// No slice has sounded yet
const NO_SLICE: usize = usize::MAX;

/// What an observer sees of the running transport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackProgress {
    pub playing: bool,
    /// Step counter since the transport origin
    pub step: u64,
    /// Slice index that most recently sounded
    pub last_slice: Option<usize>,
    /// Position within the two-bar phrase, 0.0..1.0
    pub phrase_fraction: f32,
}

impl PlaybackProgress {
    pub fn stopped() -> Self {
        Self {
            playing: false,
            step: 0,
            last_slice: None,
            phrase_fraction: 0.0,
        }
    }
}

/// Shared progress cell the transport publishes into
///
/// Plain atomics on both sides; readers poll at whatever rate they like
/// without ever touching the scheduling thread.
#[derive(Debug, Clone)]
pub struct SharedProgress {
    inner: Arc<ProgressCells>,
}

impl Default for SharedProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct ProgressCells {
    playing: AtomicBool,
    step: AtomicU64,
    last_slice: AtomicUsize,
    /// f32 bits of the phrase fraction
    phrase: AtomicU32,
}

impl SharedProgress {
    pub fn new() -> Self {
        let progress = Self {
            inner: Arc::new(ProgressCells::default()),
        };
        progress.inner.last_slice.store(NO_SLICE, Ordering::Relaxed);
        progress
    }

    pub fn publish(&self, step: u64, last_slice: Option<usize>, phrase_fraction: f32) {
        self.inner.step.store(step, Ordering::Relaxed);
        self.inner
            .last_slice
            .store(last_slice.unwrap_or(NO_SLICE), Ordering::Relaxed);
        self.inner
            .phrase
            .store(phrase_fraction.to_bits(), Ordering::Relaxed);
        self.inner.playing.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.inner.playing.store(false, Ordering::Release);
        self.inner.step.store(0, Ordering::Relaxed);
        self.inner.last_slice.store(NO_SLICE, Ordering::Relaxed);
        self.inner.phrase.store(0f32.to_bits(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PlaybackProgress {
        let playing = self.inner.playing.load(Ordering::Acquire);
        let last_slice = match self.inner.last_slice.load(Ordering::Relaxed) {
            NO_SLICE => None,
            index => Some(index),
        };
        PlaybackProgress {
            playing,
            step: self.inner.step.load(Ordering::Relaxed),
            last_slice,
            phrase_fraction: f32::from_bits(self.inner.phrase.load(Ordering::Relaxed)),
        }
    }
}
