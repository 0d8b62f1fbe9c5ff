//! # Waxwheel Deck Engine (waxwheel-engine)
//!
//! Core of a digital vinyl system: timecoded records on real turntables
//! drive playback of digital audio files.
//!
//! **Purpose:** Ingest decoded PCM from an importer subprocess into a
//! block-structured store that the playback thread reads lock-free, and
//! smooth discrete timecode position observations into a velocity estimate
//! the playback engine can consult every cycle.
//!
//! **Architecture:** One [`track::Track`] per deck. An import spawns an
//! external decoder whose stdout is drained through a non-blocking pipe by
//! the host's poll loop (the "rig"); the timecode thread feeds a
//! [`pitch::Pitch`] filter whose velocity is published through an atomic
//! for the audio thread.
//!
//! The rig, the timecode signal processing, and the audio output path are
//! external collaborators; this crate touches them only through the
//! [`rig::PollSlot`] / [`rig::Rig`] contract and the reader handles.

pub mod error;
pub mod pitch;
pub mod rig;
pub mod track;

pub use error::{Error, Result};
pub use pitch::{Pitch, PitchReader};
pub use rig::{PollSlot, Rig};
pub use track::Track;
