//! Rig integration types
//!
//! The engine never owns the event loop. The host (the "rig") polls the
//! import pipes of all decks plus its own devices; the engine only fills in
//! descriptors and interest bits, and reads readiness flags back. Two
//! capabilities cross the boundary:
//!
//! - [`PollSlot`]: a host-owned slot the track registers its pipe
//!   descriptor into ([`crate::track::Track::poll_register`]) and whose
//!   ready bits it consults in [`crate::track::Track::handle`].
//! - [`Rig`]: a wake handle the track invokes after starting an import so
//!   the host re-polls with the new descriptor instead of sleeping on the
//!   old set.

use libc::c_short;
use std::os::unix::io::RawFd;

/// Ready bits that count as "the pipe wants attention". Hangup and error
/// must be included so EOF and importer death drain the pipe promptly.
const READY_MASK: c_short = libc::POLLIN | libc::POLLHUP | libc::POLLERR;

/// Wake handle supplied by the host event loop.
///
/// `wake` must be callable from any thread and must cause the rig to
/// re-run poll registration for its tracks before sleeping again.
pub trait Rig: Send + Sync {
    fn wake(&self);
}

/// One host-owned poll registration slot.
///
/// Mirrors a `pollfd`: a descriptor, the interest mask the engine wants
/// polled, and the ready mask the host writes back after polling. The host
/// owns the slot's storage; it must hand the same slot it registered to
/// the next [`crate::track::Track::handle`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSlot {
    pub fd: RawFd,
    pub events: c_short,
    pub revents: c_short,
}

impl PollSlot {
    /// An empty, unregistered slot.
    pub fn new() -> Self {
        PollSlot {
            fd: -1,
            events: 0,
            revents: 0,
        }
    }

    /// Register a descriptor with read interest.
    pub(crate) fn arm(&mut self, fd: RawFd) {
        self.fd = fd;
        self.events = libc::POLLIN;
        self.revents = 0;
    }

    /// Clear the registration.
    pub(crate) fn disarm(&mut self) {
        self.fd = -1;
        self.events = 0;
        self.revents = 0;
    }

    /// Whether the host reported this slot ready for reading (or hung up).
    pub fn is_ready(&self) -> bool {
        self.revents & READY_MASK != 0
    }

    /// View as a `pollfd` for hosts that poll with libc directly.
    pub fn as_pollfd(&self) -> libc::pollfd {
        libc::pollfd {
            fd: self.fd,
            events: self.events,
            revents: 0,
        }
    }

    /// Copy ready bits back from a polled `pollfd`.
    pub fn set_revents(&mut self, pfd: &libc::pollfd) {
        debug_assert_eq!(self.fd, pfd.fd, "ready bits from a different descriptor");
        self.revents = pfd.revents;
    }
}

impl Default for PollSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_slot_is_not_ready() {
        let slot = PollSlot::new();
        assert_eq!(slot.fd, -1);
        assert!(!slot.is_ready());
    }

    #[test]
    fn armed_slot_reports_readiness() {
        let mut slot = PollSlot::new();
        slot.arm(7);
        assert_eq!(slot.fd, 7);
        assert_eq!(slot.events, libc::POLLIN);
        assert!(!slot.is_ready());

        slot.revents = libc::POLLIN;
        assert!(slot.is_ready());
    }

    #[test]
    fn hangup_counts_as_ready() {
        let mut slot = PollSlot::new();
        slot.arm(3);
        slot.revents = libc::POLLHUP;
        assert!(slot.is_ready(), "EOF must still drain the pipe");
    }

    #[test]
    fn disarm_clears_everything() {
        let mut slot = PollSlot::new();
        slot.arm(5);
        slot.revents = libc::POLLIN;
        slot.disarm();
        assert_eq!(slot, PollSlot::new());
    }

    #[test]
    fn pollfd_round_trip() {
        let mut slot = PollSlot::new();
        slot.arm(9);
        let mut pfd = slot.as_pollfd();
        pfd.revents = libc::POLLIN;
        slot.set_revents(&pfd);
        assert!(slot.is_ready());
    }
}
