//! Block-structured PCM store
//!
//! Audio arrives from the importer as a byte stream and is stored in
//! fixed-size blocks of interleaved stereo s16 samples plus two parallel
//! meter arrays. The store is append-only while an import runs; the
//! playback thread reads committed samples while the ingest thread is
//! still writing later ones.
//!
//! ```text
//! importer pipe → commit()                       playback thread
//!                    ↓                                 ↓
//!              BlockStore                     frame() / ppm() / overview()
//!              block 0: [pcm | ppm | overview]
//!              block 1: [pcm | ppm | overview]   ← reads below length()
//!              block n: [pcm | ppm | overview]   ← writes above it
//! ```
//!
//! ## Thread Safety
//!
//! Exactly one writer (in the engine, the thread holding the track lock)
//! drives the write methods at a time; readers never take a lock. The
//! publication protocol:
//!
//! - PCM and meter cells are relaxed atomics. They are written before the
//!   frame count moves past them and never rewritten below it (until a
//!   rewind, which moves the count down first).
//! - `length` (committed frames) is stored with Release after the cell
//!   stores and loaded with Acquire by readers, so a reader that observes
//!   frame count `n` also observes every cell of frames `< n`.
//! - Block slots are `OnceLock`ed boxes: a published block never moves,
//!   so readers can hold indices across writer growth.
//! - `bytes` and `allocated` are statistics (Relaxed).

use std::sync::atomic::{AtomicI16, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::OnceLock;

use tracing::{debug, trace};
use waxwheel_common::params::{
    BYTES_PER_FRAME, OVERVIEW_PER_BLOCK, PPM_PER_BLOCK, TRACK_BLOCK_BYTES, TRACK_BLOCK_SAMPLES,
    TRACK_MAX_BLOCKS, TRACK_OVERVIEW_RES, TRACK_PPM_RES,
};
use waxwheel_common::timing::frames_to_secs;

use super::meter::{frame_energy, OverviewFilter, PpmFilter};
use crate::error::StoreError;

/// One fixed-size unit of PCM plus its meter arrays.
///
/// Heap-allocated and address-stable for the life of the store.
pub struct Block {
    /// Interleaved stereo samples: `[L, R, L, R, ...]`.
    pcm: Box<[AtomicI16]>,

    /// One PPM byte per `TRACK_PPM_RES` frames.
    ppm: Box<[AtomicU8]>,

    /// One overview byte per `TRACK_OVERVIEW_RES` frames.
    overview: Box<[AtomicU8]>,
}

impl Block {
    fn new() -> Box<Block> {
        Box::new(Block {
            pcm: zeroed_i16(TRACK_BLOCK_SAMPLES * 2),
            ppm: zeroed_u8(PPM_PER_BLOCK),
            overview: zeroed_u8(OVERVIEW_PER_BLOCK),
        })
    }
}

fn zeroed_i16(n: usize) -> Box<[AtomicI16]> {
    let mut v = Vec::with_capacity(n);
    v.resize_with(n, || AtomicI16::new(0));
    v.into_boxed_slice()
}

fn zeroed_u8(n: usize) -> Box<[AtomicU8]> {
    let mut v = Vec::with_capacity(n);
    v.resize_with(n, || AtomicU8::new(0));
    v.into_boxed_slice()
}

/// Writer-side state that travels with the track lock.
///
/// Keeping it outside [`BlockStore`] lets the shared store stay free of
/// interior mutability beyond its atomics: everything here is reachable
/// only through whatever serializes the writer (in the engine, the track
/// mutex).
pub struct WriteCursor {
    /// Bytes of a trailing partial frame, not yet committed.
    staged: [u8; BYTES_PER_FRAME],
    staged_len: usize,

    /// Running meter state across the whole import.
    ppm: PpmFilter,
    overview: OverviewFilter,
}

impl Default for WriteCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteCursor {
    pub fn new() -> Self {
        WriteCursor {
            staged: [0; BYTES_PER_FRAME],
            staged_len: 0,
            ppm: PpmFilter::new(),
            overview: OverviewFilter::new(),
        }
    }

    fn reset(&mut self) {
        self.staged_len = 0;
        self.ppm.reset();
        self.overview.reset();
    }
}

/// Growing append-only store of PCM blocks with derived meter arrays.
pub struct BlockStore {
    /// Block table. Slots fill in order and, once set, never change; the
    /// table itself is sized to `max_blocks` up front so no reallocation
    /// ever moves a published block.
    blocks: Box<[OnceLock<Box<Block>>]>,

    /// Capacity bound in blocks.
    max_blocks: usize,

    /// Committed whole stereo frames. Release on store, Acquire on load;
    /// this is the publication point for everything below it.
    length: AtomicUsize,

    /// Raw bytes accepted from the pipe, including a trailing partial
    /// frame. Relaxed; progress reporting only.
    bytes: AtomicU64,

    /// Blocks allocated so far. Relaxed; statistics.
    allocated: AtomicUsize,
}

impl BlockStore {
    /// An empty store with the canonical `TRACK_MAX_BLOCKS` bound.
    pub fn new() -> Self {
        Self::with_max_blocks(TRACK_MAX_BLOCKS)
    }

    /// An empty store with an explicit block bound (tests exercise the
    /// full-track path without a gigabyte of input).
    pub(crate) fn with_max_blocks(max_blocks: usize) -> Self {
        assert!(max_blocks > 0, "a store needs at least one block");
        let mut blocks = Vec::with_capacity(max_blocks);
        blocks.resize_with(max_blocks, OnceLock::new);
        BlockStore {
            blocks: blocks.into_boxed_slice(),
            max_blocks,
            length: AtomicUsize::new(0),
            bytes: AtomicU64::new(0),
            allocated: AtomicUsize::new(0),
        }
    }

    // ==================== Reader API (no lock) ====================

    /// Committed frame count (Acquire; pairs with the writer's Release).
    pub fn length(&self) -> usize {
        self.length.load(Ordering::Acquire)
    }

    /// Committed length in seconds.
    pub fn seconds(&self) -> f64 {
        frames_to_secs(self.length())
    }

    /// Raw bytes accepted from the importer so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Blocks allocated so far.
    pub fn blocks_allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Capacity bound in blocks.
    pub fn max_blocks(&self) -> usize {
        self.max_blocks
    }

    /// Read a committed stereo frame. `None` at or beyond [`length`].
    ///
    /// [`length`]: BlockStore::length
    pub fn frame(&self, index: usize) -> Option<(i16, i16)> {
        if index >= self.length() {
            return None;
        }
        let block = self.blocks[index / TRACK_BLOCK_SAMPLES].get()?;
        let off = (index % TRACK_BLOCK_SAMPLES) * 2;
        Some((
            block.pcm[off].load(Ordering::Relaxed),
            block.pcm[off + 1].load(Ordering::Relaxed),
        ))
    }

    /// Number of PPM buckets that contain at least one committed frame.
    pub fn ppm_buckets(&self) -> usize {
        (self.length() + TRACK_PPM_RES - 1) / TRACK_PPM_RES
    }

    /// Read a PPM meter byte. `None` for buckets with no committed frames.
    pub fn ppm(&self, bucket: usize) -> Option<u8> {
        if bucket >= self.ppm_buckets() {
            return None;
        }
        let frame = bucket * TRACK_PPM_RES;
        let block = self.blocks[frame / TRACK_BLOCK_SAMPLES].get()?;
        let off = (frame % TRACK_BLOCK_SAMPLES) / TRACK_PPM_RES;
        Some(block.ppm[off].load(Ordering::Relaxed))
    }

    /// Number of overview buckets that contain at least one committed frame.
    pub fn overview_buckets(&self) -> usize {
        (self.length() + TRACK_OVERVIEW_RES - 1) / TRACK_OVERVIEW_RES
    }

    /// Read an overview meter byte. `None` for buckets with no committed
    /// frames.
    pub fn overview(&self, bucket: usize) -> Option<u8> {
        if bucket >= self.overview_buckets() {
            return None;
        }
        let frame = bucket * TRACK_OVERVIEW_RES;
        let block = self.blocks[frame / TRACK_BLOCK_SAMPLES].get()?;
        let off = (frame % TRACK_BLOCK_SAMPLES) / TRACK_OVERVIEW_RES;
        Some(block.overview[off].load(Ordering::Relaxed))
    }

    // ==================== Writer API ====================
    //
    // At most one thread may drive these at a time; the track serializes
    // them under its mutex. They take &self because all shared state is
    // atomic, but two concurrent writers would interleave frames.

    /// Bytes writable at the byte cursor inside the current block,
    /// allocating the next block first when the cursor sits at the end of
    /// the allocated region. The window never spans a block boundary; a
    /// writer wanting more commits and asks again.
    pub fn writable_len(&self) -> Result<usize, StoreError> {
        let bytes = self.bytes.load(Ordering::Relaxed) as usize;
        let block_idx = bytes / TRACK_BLOCK_BYTES;
        let offset = bytes % TRACK_BLOCK_BYTES;

        if offset == 0 {
            if block_idx == self.max_blocks {
                return Err(StoreError::TrackFull {
                    blocks: self.max_blocks,
                });
            }
            if self.blocks[block_idx].get().is_none() {
                let _ = self.blocks[block_idx].set(Block::new());
                self.allocated.store(block_idx + 1, Ordering::Relaxed);
                debug!(
                    "allocated block {}/{} ({} KiB PCM)",
                    block_idx + 1,
                    self.max_blocks,
                    TRACK_BLOCK_BYTES / 1024
                );
            }
        }

        Ok(TRACK_BLOCK_BYTES - offset)
    }

    /// Accept `buf` at the byte cursor: stage or complete partial frames,
    /// store whole frames and their meter bytes, then publish the new
    /// committed length.
    ///
    /// `buf` must fit inside the window the last [`writable_len`] call
    /// offered (it never crosses a block boundary).
    ///
    /// [`writable_len`]: BlockStore::writable_len
    pub fn commit(&self, cursor: &mut WriteCursor, buf: &[u8]) {
        let bytes_before = self.bytes.load(Ordering::Relaxed);
        debug_assert!(
            (bytes_before as usize % TRACK_BLOCK_BYTES) + buf.len() <= TRACK_BLOCK_BYTES,
            "commit crosses a block boundary"
        );

        let mut frames = self.length.load(Ordering::Relaxed);
        let mut input = buf;

        // Complete a frame left staged by a previous commit.
        if cursor.staged_len > 0 {
            let take = (BYTES_PER_FRAME - cursor.staged_len).min(input.len());
            cursor.staged[cursor.staged_len..cursor.staged_len + take]
                .copy_from_slice(&input[..take]);
            cursor.staged_len += take;
            input = &input[take..];
            if cursor.staged_len == BYTES_PER_FRAME {
                let staged = cursor.staged;
                self.store_frame(frames, &staged, cursor);
                frames += 1;
                cursor.staged_len = 0;
            }
        }

        let mut whole = input.chunks_exact(BYTES_PER_FRAME);
        for chunk in &mut whole {
            self.store_frame(frames, chunk, cursor);
            frames += 1;
        }

        // Stage a trailing partial frame for the next commit.
        let rem = whole.remainder();
        cursor.staged[..rem.len()].copy_from_slice(rem);
        cursor.staged_len = rem.len();

        self.bytes
            .store(bytes_before + buf.len() as u64, Ordering::Relaxed);
        // Publish: every cell store above happens-before a reader that
        // observes the new length.
        self.length.store(frames, Ordering::Release);

        trace!("committed {} bytes, length now {} frames", buf.len(), frames);
        debug_assert!(frames as u64 * BYTES_PER_FRAME as u64 <= self.bytes_written());
        debug_assert!(self.bytes_written() < (frames as u64 + 1) * BYTES_PER_FRAME as u64);
    }

    /// Store one frame's PCM and meter bytes (cells only; length is
    /// published by the caller).
    fn store_frame(&self, frame_idx: usize, b: &[u8], cursor: &mut WriteCursor) {
        let left = i16::from_le_bytes([b[0], b[1]]);
        let right = i16::from_le_bytes([b[2], b[3]]);

        // The block was allocated by writable_len before these bytes were
        // read; a miss here is caller misuse, which is fatal.
        let block = self.blocks[frame_idx / TRACK_BLOCK_SAMPLES]
            .get()
            .expect("frame committed into an unallocated block");
        let off = frame_idx % TRACK_BLOCK_SAMPLES;
        block.pcm[off * 2].store(left, Ordering::Relaxed);
        block.pcm[off * 2 + 1].store(right, Ordering::Relaxed);

        let v = frame_energy(left, right);
        let ppm = cursor.ppm.update(v);
        block.ppm[off / TRACK_PPM_RES].store(ppm, Ordering::Relaxed);
        let ov = cursor.overview.update(v);
        block.overview[off / TRACK_OVERVIEW_RES].store(ov, Ordering::Relaxed);
    }

    /// Rewind for a fresh import: counters and meter state go to zero,
    /// allocated blocks are kept and will be overwritten from offset zero.
    pub fn rewind(&self, cursor: &mut WriteCursor) {
        // Take the published length down first so readers stop looking at
        // samples that are about to be overwritten.
        self.length.store(0, Ordering::Release);
        self.bytes.store(0, Ordering::Relaxed);
        cursor.reset();
        debug!(
            "store rewound, {} allocated blocks retained",
            self.blocks_allocated()
        );
    }
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStore")
            .field("length", &self.length.load(Ordering::Relaxed))
            .field("bytes", &self.bytes.load(Ordering::Relaxed))
            .field("allocated", &self.allocated.load(Ordering::Relaxed))
            .field("max_blocks", &self.max_blocks)
            .finish()
    }
}
