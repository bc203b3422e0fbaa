// SPDX-License-Identifier: MIT
// Copyright (c) 2026 vbcache contributors – https://github.com/vbcache/vbcache

use std::io;
use std::ops::BitOr;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Readiness interest mask. Each connection mirrors the mask it last handed
/// to the reactor, so interest changes are diffed instead of re-registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest(u8);

impl Interest {
    pub const NONE: Interest = Interest(0);
    pub const READ: Interest = Interest(0b01);
    pub const WRITE: Interest = Interest(0b10);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn readable(self) -> bool {
        self.0 & Interest::READ.0 != 0
    }

    pub fn writable(self) -> bool {
        self.0 & Interest::WRITE.0 != 0
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

/// One readiness notification: which watch (by token) fired, and in which
/// directions. Errors and hangups surface as both-ready so the owner's read
/// and write paths observe them.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub token: usize,
    pub readable: bool,
    pub writable: bool,
}

/// The readiness reactor seam.
///
/// Deliberately narrow so the event-library choice stays swappable: register
/// a file descriptor under a token, change its interest, remove it, and wait.
/// The driver loop owns all state; the reactor only reports readiness.
pub trait Reactor {
    fn watch(&mut self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()>;

    fn update(&mut self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()>;

    fn unwatch(&mut self, fd: RawFd) -> io::Result<()>;

    /// Blocks until at least one watched descriptor is ready or the timeout
    /// elapses, appending notifications to `events`.
    fn poll(&mut self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_mask_combines() {
        let rw = Interest::READ | Interest::WRITE;
        assert!(rw.readable());
        assert!(rw.writable());
        assert!(!Interest::READ.writable());
        assert!(!Interest::NONE.readable());
        assert!(Interest::NONE.is_empty());
        assert_eq!(Interest::READ | Interest::READ, Interest::READ);
    }
}
