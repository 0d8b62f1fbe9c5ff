//! Canonical track constants
//!
//! Every crate in the workspace derives its buffer geometry from these
//! values, so they live in one place. They are compile-time constants:
//! the importer protocol, the block store layout, and the meter arrays all
//! bake them in, and a mismatch between two crates would corrupt PCM data
//! silently.
//!
//! # Geometry
//!
//! A track is stored as a sequence of fixed-size blocks. Each block holds
//! `TRACK_BLOCK_SAMPLES` interleaved stereo frames of signed 16-bit PCM plus
//! two parallel meter arrays:
//!
//! - one PPM byte per `TRACK_PPM_RES` frames (fast attack, slow release),
//! - one overview byte per `TRACK_OVERVIEW_RES` frames (whole-track
//!   waveform thumbnail).
//!
//! `TRACK_MAX_BLOCKS` bounds the memory of a fully loaded track at
//! `TRACK_MAX_BLOCKS * TRACK_BLOCK_BYTES` PCM bytes (~1 GiB, a bit over
//! 100 minutes at 44.1 kHz). Decks that never load material that long never
//! allocate the tail blocks.

/// Channels per frame. The entire engine is stereo; the importer protocol
/// requires interleaved stereo output.
pub const TRACK_CHANNELS: usize = 2;

/// System sample rate in Hz. Importers must emit PCM at this rate.
pub const TRACK_RATE: u32 = 44_100;

/// Stereo frames per block (1 MiB of PCM per block).
pub const TRACK_BLOCK_SAMPLES: usize = 1 << 18;

/// Frames per PPM meter bucket.
pub const TRACK_PPM_RES: usize = 64;

/// Frames per overview meter bucket.
pub const TRACK_OVERVIEW_RES: usize = 2048;

/// Upper bound on blocks per track; dictates the maximum importable length.
pub const TRACK_MAX_BLOCKS: usize = 1024;

/// Bytes per interleaved stereo frame of signed 16-bit PCM.
pub const BYTES_PER_FRAME: usize = TRACK_CHANNELS * 2;

/// PCM bytes per block.
pub const TRACK_BLOCK_BYTES: usize = TRACK_BLOCK_SAMPLES * BYTES_PER_FRAME;

/// PPM meter bytes per block.
pub const PPM_PER_BLOCK: usize = TRACK_BLOCK_SAMPLES / TRACK_PPM_RES;

/// Overview meter bytes per block.
pub const OVERVIEW_PER_BLOCK: usize = TRACK_BLOCK_SAMPLES / TRACK_OVERVIEW_RES;

// Meter resolutions must divide the block size so buckets never span blocks.
const _: () = assert!(TRACK_BLOCK_SAMPLES % TRACK_PPM_RES == 0);
const _: () = assert!(TRACK_BLOCK_SAMPLES % TRACK_OVERVIEW_RES == 0);
// Frames must not span blocks either.
const _: () = assert!(TRACK_BLOCK_BYTES % BYTES_PER_FRAME == 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_geometry_consistent() {
        assert_eq!(TRACK_BLOCK_BYTES, TRACK_BLOCK_SAMPLES * 4);
        assert_eq!(PPM_PER_BLOCK * TRACK_PPM_RES, TRACK_BLOCK_SAMPLES);
        assert_eq!(OVERVIEW_PER_BLOCK * TRACK_OVERVIEW_RES, TRACK_BLOCK_SAMPLES);
    }

    #[test]
    fn max_track_exceeds_an_hour() {
        let max_frames = TRACK_MAX_BLOCKS * TRACK_BLOCK_SAMPLES;
        let seconds = max_frames as f64 / TRACK_RATE as f64;
        assert!(seconds > 3600.0, "max track length {seconds}s is too short");
    }
}
