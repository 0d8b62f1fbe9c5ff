//! Error types for the deck engine
//!
//! Expected failures travel as `Result` values with enum errors; the track
//! is always left in a valid state (committed samples stay playable).
//! Caller misuse of the API is a programming error and panics.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the deck engine
#[derive(Debug, Error)]
pub enum Error {
    /// Importer subprocess lifecycle errors
    #[error("import error: {0}")]
    Import(#[from] ImportError),

    /// Ingest pump errors
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Block store errors
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// IO errors from descriptor operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Errors from the importer subprocess manager
#[derive(Debug, Error)]
pub enum ImportError {
    /// The importer executable could not be launched. The track stays idle
    /// and no partial state is visible.
    #[error("failed to launch importer {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The pipe read end could not be switched to non-blocking mode.
    #[error("failed to configure importer pipe: {0}")]
    Pipe(#[source] std::io::Error),
}

/// Errors from the ingest pump
///
/// Both variants are fatal for the running import: the caller aborts the
/// child and returns the track to idle, keeping the committed prefix.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A read from the pipe failed with something other than "would block".
    #[error("read from importer failed: {0}")]
    Io(#[from] std::io::Error),

    /// The block store refused more data.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the block store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Every block is committed; the track cannot grow further.
    #[error("track full: all {blocks} blocks in use")]
    TrackFull { blocks: usize },
}

/// Result type alias using the engine error type
pub type Result<T> = std::result::Result<T, Error>;
