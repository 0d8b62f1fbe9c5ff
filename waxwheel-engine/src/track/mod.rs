//! Track lifecycle and synchronization
//!
//! One [`Track`] per deck. It owns the block store the playback thread
//! reads from, and (while an import runs) the importer child plus the
//! write cursor for the store. Four threads touch a track:
//!
//! - the **rig thread** registers the import pipe for polling
//!   ([`Track::poll_register`]) and drains it ([`Track::handle`]);
//! - a **controller** (often the same thread) starts imports
//!   ([`Track::import`]) and resets decks;
//! - the **playback thread** reads committed samples and meters through
//!   the shared [`BlockStore`] handle, without any lock;
//! - anything may query metadata.
//!
//! All mutation happens under the track mutex. The playback path relies
//! solely on the store's acquire/release publication, so an audio callback
//! never contends with an import in progress.

mod blocks;
mod importer;
mod ingest;
pub mod meter;

pub use blocks::{Block, BlockStore, WriteCursor};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};
use waxwheel_common::params::TRACK_RATE;

use crate::error::{IngestError, Result, StoreError};
use crate::rig::{PollSlot, Rig};
use importer::ImporterChild;
use ingest::{pump, PumpStatus};

/// Read buffer for one pump pass. Large enough to drain a default pipe
/// buffer in a couple of reads without hogging the track lock.
const SCRATCH_BYTES: usize = 32 * 1024;

/// A running import: the child and the scratch buffer its bytes land in
/// before being committed.
struct ImportJob {
    child: ImporterChild,
    scratch: Box<[u8]>,
}

/// State guarded by the track mutex.
struct TrackInner {
    cursor: WriteCursor,
    job: Option<ImportJob>,
    artist: Option<String>,
    title: Option<String>,
}

/// One deck's track: a loaded (or loading) piece of audio.
pub struct Track {
    /// External decoder executable, fixed at construction.
    importer_path: PathBuf,

    /// Shared PCM/meter store. Clones of this handle are how the playback
    /// engine reads; the store outlives nothing (it drops with the deck).
    store: Arc<BlockStore>,

    /// Mutable track state (write cursor, running import, metadata).
    inner: Mutex<TrackInner>,

    /// Whether the import pipe is currently registered with the rig.
    /// Written under the lock, probed without it in [`Track::handle`];
    /// Relaxed is enough because `handle` re-checks under the lock and
    /// only the rig thread consumes the flag.
    registered: AtomicBool,

    /// Host wake handle, invoked after a successful import start.
    rig: Arc<dyn Rig>,
}

impl Track {
    /// Create an idle track for a deck.
    pub fn new(importer_path: impl Into<PathBuf>, rig: Arc<dyn Rig>) -> Self {
        let importer_path = importer_path.into();
        debug!("track created, importer {}", importer_path.display());
        Track {
            importer_path,
            store: Arc::new(BlockStore::new()),
            inner: Mutex::new(TrackInner {
                cursor: WriteCursor::new(),
                job: None,
                artist: None,
                title: None,
            }),
            registered: AtomicBool::new(false),
            rig,
        }
    }

    /// Start importing `source`, replacing any import already running.
    ///
    /// The running child (if any) is aborted first. On success the store
    /// has been rewound for the new stream and the rig has been woken so
    /// its next poll round picks up the new descriptor. On failure the
    /// track is idle and previously committed samples are untouched.
    pub fn import(&self, source: impl AsRef<Path>) -> Result<()> {
        let source = source.as_ref();
        let mut inner = self.inner.lock().unwrap();

        if let Some(job) = inner.job.take() {
            self.registered.store(false, Ordering::Relaxed);
            warn!(
                "import of {} replaces a still-running import of {}",
                source.display(),
                job.child.source().display()
            );
            job.child.abort();
        }

        // Spawn before rewinding: a failed spawn must leave the previous
        // contents readable.
        let child = ImporterChild::spawn(&self.importer_path, source)?;

        let TrackInner { cursor, job, .. } = &mut *inner;
        self.store.rewind(cursor);
        *job = Some(ImportJob {
            child,
            scratch: vec![0u8; SCRATCH_BYTES].into_boxed_slice(),
        });
        drop(inner);

        info!("importing {}", source.display());
        self.rig.wake();
        Ok(())
    }

    /// Register the import pipe in the host's poll slot.
    ///
    /// Returns `true` and arms the slot with the pipe descriptor while an
    /// import is running; otherwise disarms the slot and returns `false`.
    /// The host owns the slot and must pass the same slot, with ready bits
    /// filled in, to the next [`Track::handle`] call.
    pub fn poll_register(&self, slot: &mut PollSlot) -> bool {
        let inner = self.inner.lock().unwrap();
        match &inner.job {
            Some(job) => {
                slot.arm(job.child.poll_fd());
                self.registered.store(true, Ordering::Relaxed);
                true
            }
            None => {
                slot.disarm();
                self.registered.store(false, Ordering::Relaxed);
                false
            }
        }
    }

    /// Service the import after a poll round.
    ///
    /// Cheap when there is nothing to do: if the track never registered a
    /// slot, or the slot reports no ready events, this returns without
    /// touching the lock. That probe is safe only because a single rig
    /// thread owns both the slot and all `handle` calls for this track;
    /// that ownership is part of the event-loop contract.
    ///
    /// When the pipe is ready: pump it. On end of stream the importer is
    /// stopped (it has exited, or will promptly); on a fatal ingest error
    /// it is aborted. Either way the committed samples stay playable and
    /// the track returns to idle.
    pub fn handle(&self, slot: &PollSlot) {
        if !self.registered.load(Ordering::Relaxed) || !slot.is_ready() {
            return;
        }

        let mut inner = self.inner.lock().unwrap();
        let TrackInner { cursor, job, .. } = &mut *inner;
        let Some(running) = job.as_mut() else {
            // Import was replaced or torn down after the poll round.
            return;
        };

        let outcome = pump(
            &self.store,
            cursor,
            running.child.pipe_mut(),
            &mut running.scratch,
        );

        match outcome {
            Ok(PumpStatus::Pending) => {}
            Ok(PumpStatus::Done) => {
                let finished = job.take().expect("job vanished under the lock");
                self.registered.store(false, Ordering::Relaxed);
                finished.child.stop();
                info!(
                    "import complete: {} frames ({:.1}s)",
                    self.store.length(),
                    self.store.seconds()
                );
            }
            Err(e) => {
                let failed = job.take().expect("job vanished under the lock");
                self.registered.store(false, Ordering::Relaxed);
                match &e {
                    IngestError::Store(StoreError::TrackFull { blocks }) => warn!(
                        "track full after {blocks} blocks, keeping {} frames",
                        self.store.length()
                    ),
                    IngestError::Io(err) => warn!("import read failed: {err}"),
                }
                failed.child.abort();
            }
        }
    }

    /// Abort any running import and empty the deck.
    ///
    /// Allocated blocks are retained for the next import; dropping the
    /// track releases them.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.job.take() {
            self.registered.store(false, Ordering::Relaxed);
            job.child.abort();
        }
        let TrackInner { cursor, .. } = &mut *inner;
        self.store.rewind(cursor);
        inner.artist = None;
        inner.title = None;
        debug!("track reset");
    }

    /// Whether an import is currently running.
    pub fn is_importing(&self) -> bool {
        self.inner.lock().unwrap().job.is_some()
    }

    /// Committed frame count (lock-free).
    pub fn length(&self) -> usize {
        self.store.length()
    }

    /// Committed length in seconds (lock-free).
    pub fn seconds(&self) -> f64 {
        self.store.seconds()
    }

    /// Sample rate of the stored audio. Fixed to the system rate; the
    /// importer contract pins its output to the same value.
    pub fn sample_rate(&self) -> u32 {
        TRACK_RATE
    }

    /// Reader handle for the playback engine. Reads through this handle
    /// never take the track lock.
    pub fn store(&self) -> Arc<BlockStore> {
        Arc::clone(&self.store)
    }

    /// The importer executable this deck launches.
    pub fn importer_path(&self) -> &Path {
        &self.importer_path
    }

    pub fn set_artist(&self, artist: impl Into<String>) {
        self.inner.lock().unwrap().artist = Some(artist.into());
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.inner.lock().unwrap().title = Some(title.into());
    }

    /// Artist and title, if set.
    pub fn metadata(&self) -> (Option<String>, Option<String>) {
        let inner = self.inner.lock().unwrap();
        (inner.artist.clone(), inner.title.clone())
    }
}

impl Drop for Track {
    /// A dropped deck must not leave a decoder running or a zombie behind.
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(job) = inner.job.take() {
                debug!("aborting import on track drop");
                job.child.abort();
            }
        }
    }
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("importer", &self.importer_path)
            .field("length", &self.store.length())
            .field("importing", &self.registered.load(Ordering::Relaxed))
            .finish()
    }
}
