//! Pitch estimation from timecode position observations
//!
//! The timecode decoder reports how far the needle advanced since its last
//! observation, once per fixed period `dt`. Those deltas are noisy and
//! quantized; feeding them straight into the playback resampler would
//! warble. This filter maintains a two-state (position, velocity) estimate
//! and exposes a smooth velocity for the playback engine.
//!
//! It is a fixed-gain alpha-beta filter: predict position from the current
//! velocity, compare against the observed advance, and fold the residual
//! back into both states. After each update the position state is rebased
//! so the next observation can again be expressed as a delta.
//!
//! ## Thread Safety
//!
//! `observe` belongs to the timecode thread and takes `&mut self`. The
//! playback thread reads the velocity through a [`PitchReader`] without any
//! lock: the f64 is published as a bit-cast `AtomicU64` word (relaxed
//! ordering; a one-cycle-stale velocity is harmless, torn reads are not
//! possible on a single word).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Position coupling gain. Determined empirically against real turntables;
/// not runtime-tunable.
pub const ALPHA: f64 = 1.0 / 512.0;

/// Velocity coupling gain.
pub const BETA: f64 = ALPHA / 1024.0;

/// Two-state pitch filter owned by the timecode thread.
pub struct Pitch {
    /// Observation period in seconds (immutable after construction).
    dt: f64,

    /// Residual position relative to the last observation, in the same
    /// units as the observed deltas.
    x: f64,

    /// Velocity estimate in position units per second.
    v: f64,

    /// Published copy of `v` for lock-free readers (f64 bits in a u64).
    shared: Arc<AtomicU64>,
}

impl Pitch {
    /// Create a filter for observations arriving every `dt` seconds.
    ///
    /// # Panics
    /// Panics if `dt` is not strictly positive.
    pub fn new(dt: f64) -> Self {
        assert!(dt > 0.0, "observation period must be positive");
        debug!("pitch filter created: dt={dt}");
        Pitch {
            dt,
            x: 0.0,
            v: 0.0,
            shared: Arc::new(AtomicU64::new(0.0f64.to_bits())),
        }
    }

    /// Fold in one observation.
    ///
    /// `dx` is the position advance since the previous observation. Units
    /// are up to the caller (seconds of record travel, normalized grooves);
    /// velocity comes out in the same units per second, so a record playing
    /// at normal speed with `dx` measured in seconds converges to 1.0.
    pub fn observe(&mut self, dx: f64) {
        let predicted_x = self.x + self.v * self.dt;
        let residual = dx - predicted_x;

        self.x = predicted_x + residual * ALPHA;
        self.v += residual * BETA / self.dt;

        // Rebase so the next observation is again a delta from "here".
        self.x -= dx;

        self.shared.store(self.v.to_bits(), Ordering::Relaxed);
    }

    /// Current velocity estimate.
    pub fn velocity(&self) -> f64 {
        self.v
    }

    /// Residual position error (mostly useful in tests and diagnostics).
    pub fn position_error(&self) -> f64 {
        self.x
    }

    /// Observation period.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Zero the state (needle lifted, deck stopped).
    pub fn reset(&mut self) {
        self.x = 0.0;
        self.v = 0.0;
        self.shared.store(0.0f64.to_bits(), Ordering::Relaxed);
        debug!("pitch filter reset");
    }

    /// A lock-free velocity reader for the playback thread.
    pub fn reader(&self) -> PitchReader {
        PitchReader {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Read half of the pitch filter (playback thread).
///
/// Clone freely; all clones observe the same published velocity.
#[derive(Clone)]
pub struct PitchReader {
    shared: Arc<AtomicU64>,
}

impl PitchReader {
    /// Most recently published velocity estimate.
    pub fn velocity(&self) -> f64 {
        f64::from_bits(self.shared.load(Ordering::Relaxed))
    }
}
