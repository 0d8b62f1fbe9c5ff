//! Importer subprocess manager
//!
//! Decoding is delegated to an external executable: it receives the source
//! path as its single argument (with `argv[0]` set to `import`, so one
//! binary can multiplex several roles) and writes raw interleaved stereo
//! s16le PCM at the system rate to stdout. This module owns the child and
//! the read end of its pipe.
//!
//! The pipe is switched to non-blocking mode at spawn: the rig's poll loop
//! drains it opportunistically and must never stall the thread that also
//! services other decks. The only blocking call in here is the `wait` in
//! [`ImporterChild::stop`], after the child has exited or been signalled.
//!
//! A child that exits non-zero or on a signal is logged and nothing more;
//! whatever whole samples it produced before dying remain valid, so a
//! truncated download or a codec hiccup still leaves a playable prefix.

use std::io::Read;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::ImportError;

/// A running importer: the child process plus the non-blocking read end of
/// its stdout pipe.
pub(crate) struct ImporterChild {
    child: Child,
    stdout: ChildStdout,
    importer: PathBuf,
    source: PathBuf,
}

impl ImporterChild {
    /// Launch `importer` against `source`.
    ///
    /// stdout is piped (and made non-blocking), stderr passes through to
    /// the host's stderr, stdin is closed. On any failure the child is
    /// reaped before returning, so no partial state leaks.
    pub(crate) fn spawn(importer: &Path, source: &Path) -> Result<Self, ImportError> {
        let mut command = Command::new(importer);
        command
            .arg0("import")
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        // Rust ignores SIGPIPE process-wide and exec'd children inherit
        // that disposition; restore the default so an importer writing
        // into a closed pipe dies instead of looping on EPIPE.
        unsafe {
            command.pre_exec(|| {
                libc::signal(libc::SIGPIPE, libc::SIG_DFL);
                Ok(())
            });
        }

        let mut child = command.spawn().map_err(|source| ImportError::Spawn {
            path: importer.to_path_buf(),
            source,
        })?;

        // Guaranteed present with Stdio::piped; losing it would leak the
        // child, so reap on the error path anyway.
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ImportError::Pipe(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "child has no stdout pipe",
                )));
            }
        };

        if let Err(e) = set_nonblocking(stdout.as_raw_fd()) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ImportError::Pipe(e));
        }

        debug!(
            "importer launched: {} {} (pid {})",
            importer.display(),
            source.display(),
            child.id()
        );

        Ok(ImporterChild {
            child,
            stdout,
            importer: importer.to_path_buf(),
            source: source.to_path_buf(),
        })
    }

    /// Descriptor for the rig's poll set.
    pub(crate) fn poll_fd(&self) -> RawFd {
        self.stdout.as_raw_fd()
    }

    /// The pipe as a reader; reads fail with `WouldBlock` when drained.
    pub(crate) fn pipe_mut(&mut self) -> &mut impl Read {
        &mut self.stdout
    }

    /// Source path this child is decoding.
    pub(crate) fn source(&self) -> &Path {
        &self.source
    }

    /// Close the pipe and wait for the child to exit.
    ///
    /// Consumes the importer: there is exactly one stop per successful
    /// spawn, whether the import completed or was aborted. Returns whether
    /// the child exited cleanly; a failed child is logged, not escalated,
    /// because the committed samples are valid either way.
    pub(crate) fn stop(self) -> bool {
        let ImporterChild {
            mut child,
            stdout,
            importer,
            source,
        } = self;

        // Close our end first; a child still writing sees EPIPE/SIGPIPE.
        drop(stdout);

        match child.wait() {
            Ok(status) if status.success() => {
                info!("importer finished: {}", source.display());
                true
            }
            Ok(status) => {
                warn!(
                    "importer {} failed on {}: {}",
                    importer.display(),
                    source.display(),
                    status
                );
                false
            }
            Err(e) => {
                warn!("failed to reap importer {}: {}", importer.display(), e);
                false
            }
        }
    }

    /// Terminate the child, then stop.
    ///
    /// SIGTERM rather than SIGKILL so a well-behaved importer can flush
    /// its own resources; `stop` then reaps it.
    pub(crate) fn abort(self) {
        debug!("aborting importer (pid {})", self.child.id());
        // SAFETY: the pid belongs to a child we have not reaped yet, so it
        // cannot have been recycled.
        unsafe {
            libc::kill(self.child.id() as libc::pid_t, libc::SIGTERM);
        }
        self.stop();
    }
}

impl std::fmt::Debug for ImporterChild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImporterChild")
            .field("pid", &self.child.id())
            .field("importer", &self.importer)
            .field("source", &self.source)
            .finish()
    }
}

/// Put a descriptor into non-blocking mode.
fn set_nonblocking(fd: RawFd) -> std::io::Result<()> {
    // SAFETY: fd is a valid, owned descriptor for the duration of the call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn spawn_failure_reports_the_path() {
        let missing = PathBuf::from("/nonexistent/waxwheel-importer");
        let err = ImporterChild::spawn(&missing, Path::new("song.flac")).unwrap_err();
        match err {
            ImportError::Spawn { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn pipe_is_nonblocking_immediately() {
        // A child that writes nothing: the first read either sees EOF
        // (child already exited) or WouldBlock. It must never stall.
        let mut child = ImporterChild::spawn(Path::new("/bin/true"), Path::new("ignored"))
            .expect("/bin/true must exist for this test");
        let mut buf = [0u8; 16];
        match child.pipe_mut().read(&mut buf) {
            Ok(0) => {}
            Ok(n) => panic!("unexpected {n} bytes from /bin/true"),
            Err(e) => assert_eq!(e.kind(), ErrorKind::WouldBlock),
        }
        assert!(child.stop());
    }

    #[test]
    fn abort_terminates_a_busy_child() {
        let start = std::time::Instant::now();
        let child = ImporterChild::spawn(Path::new("/bin/sleep"), Path::new("30")).unwrap();
        child.abort();
        assert!(
            start.elapsed() < std::time::Duration::from_secs(5),
            "abort should not wait out the child"
        );
    }
}
