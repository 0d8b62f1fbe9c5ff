//! Ingest pump
//!
//! Moves bytes from the importer pipe into the block store whenever the
//! rig reports the descriptor readable. Runs under the track lock; the
//! reads themselves never block, so holding the lock here cannot starve
//! the controller.
//!
//! The pump is written against any `Read` whose reads fail with
//! `WouldBlock` when drained; in production that is the importer's
//! non-blocking pipe, in tests a scripted reader.

use std::io::{ErrorKind, Read};

use tracing::{debug, trace};

use super::blocks::{BlockStore, WriteCursor};
use crate::error::IngestError;

/// Why the pump returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PumpStatus {
    /// The pipe is drained for now; more data is expected later.
    Pending,

    /// The importer closed its end; the stream is complete.
    Done,
}

/// Drain the pipe into the store until it would block or ends.
///
/// Each iteration asks the store for its current writable window (never
/// spanning a block boundary), reads at most that many bytes, and commits
/// what arrived. Errors are fatal for the import: the caller aborts the
/// child and keeps the committed prefix.
pub(crate) fn pump(
    store: &BlockStore,
    cursor: &mut WriteCursor,
    pipe: &mut impl Read,
    scratch: &mut [u8],
) -> Result<PumpStatus, IngestError> {
    loop {
        let window = store.writable_len()?;
        let want = window.min(scratch.len());

        match pipe.read(&mut scratch[..want]) {
            Ok(0) => {
                debug!("importer EOF after {} frames", store.length());
                return Ok(PumpStatus::Done);
            }
            Ok(n) => {
                store.commit(cursor, &scratch[..n]);
                trace!("pumped {n} bytes");
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(PumpStatus::Pending),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(IngestError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::collections::VecDeque;
    use std::io;

    /// A pipe stand-in that plays back a script of read results.
    struct ScriptedPipe {
        script: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedPipe {
        fn new(script: Vec<io::Result<Vec<u8>>>) -> Self {
            ScriptedPipe {
                script: script.into(),
            }
        }
    }

    impl Read for ScriptedPipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.pop_front() {
                None => Ok(0),
                Some(Ok(data)) => {
                    assert!(data.len() <= buf.len(), "script chunk exceeds window");
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(e)) => Err(e),
            }
        }
    }

    fn would_block() -> io::Error {
        io::Error::new(ErrorKind::WouldBlock, "drained")
    }

    #[test]
    fn drains_until_would_block() {
        let store = BlockStore::new();
        let mut cursor = WriteCursor::new();
        let mut scratch = vec![0u8; 4096];

        let mut pipe = ScriptedPipe::new(vec![
            Ok(vec![1, 0, 2, 0, 3, 0, 4, 0]),
            Ok(vec![5, 0, 6, 0]),
            Err(would_block()),
        ]);

        let status = pump(&store, &mut cursor, &mut pipe, &mut scratch).unwrap();
        assert_eq!(status, PumpStatus::Pending);
        assert_eq!(store.length(), 3);
        assert_eq!(store.frame(0), Some((1, 2)));
        assert_eq!(store.frame(2), Some((5, 6)));
    }

    #[test]
    fn eof_reports_done() {
        let store = BlockStore::new();
        let mut cursor = WriteCursor::new();
        let mut scratch = vec![0u8; 4096];

        let mut pipe = ScriptedPipe::new(vec![Ok(vec![9, 0, 9, 0])]);

        let status = pump(&store, &mut cursor, &mut pipe, &mut scratch).unwrap();
        assert_eq!(status, PumpStatus::Done);
        assert_eq!(store.length(), 1);
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let store = BlockStore::new();
        let mut cursor = WriteCursor::new();
        let mut scratch = vec![0u8; 4096];

        let mut pipe = ScriptedPipe::new(vec![
            Err(io::Error::new(ErrorKind::Interrupted, "signal")),
            Ok(vec![7, 0, 7, 0]),
            Err(would_block()),
        ]);

        let status = pump(&store, &mut cursor, &mut pipe, &mut scratch).unwrap();
        assert_eq!(status, PumpStatus::Pending);
        assert_eq!(store.length(), 1);
    }

    #[test]
    fn hard_read_errors_are_fatal() {
        let store = BlockStore::new();
        let mut cursor = WriteCursor::new();
        let mut scratch = vec![0u8; 4096];

        let mut pipe = ScriptedPipe::new(vec![
            Ok(vec![1, 0, 1, 0]),
            Err(io::Error::new(ErrorKind::BrokenPipe, "gone")),
        ]);

        let err = pump(&store, &mut cursor, &mut pipe, &mut scratch).unwrap_err();
        assert!(matches!(err, IngestError::Io(_)));
        // The committed prefix survives the failure.
        assert_eq!(store.length(), 1);
    }

    #[test]
    fn full_store_stops_the_pump() {
        let store = BlockStore::with_max_blocks(1);
        let mut cursor = WriteCursor::new();
        let mut scratch = vec![0u8; 64 * 1024];

        // More than one block of silence, delivered in scratch-sized bites.
        let block_bytes = waxwheel_common::params::TRACK_BLOCK_BYTES;
        let mut script: Vec<io::Result<Vec<u8>>> = Vec::new();
        for _ in 0..(block_bytes / scratch.len()) {
            script.push(Ok(vec![0u8; scratch.len()]));
        }
        script.push(Ok(vec![0u8; 4]));
        let mut pipe = ScriptedPipe::new(script);

        let err = pump(&store, &mut cursor, &mut pipe, &mut scratch).unwrap_err();
        assert!(matches!(
            err,
            IngestError::Store(StoreError::TrackFull { blocks: 1 })
        ));
        assert_eq!(store.length(), waxwheel_common::params::TRACK_BLOCK_SAMPLES);
    }
}
