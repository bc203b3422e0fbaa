// SPDX-License-Identifier: MIT
// Copyright (c) 2026 vbcache contributors – https://github.com/vbcache/vbcache

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::Token;
use vbcache_core::{Event, Interest, Reactor};

/// Default readiness reactor on top of `mio::Poll`.
///
/// Watches raw descriptors (the connection layer owns the sockets) keyed by
/// server-index tokens. Error and hangup conditions are reported as both
/// readable and writable so the connect retry and the read path each get a
/// chance to observe the failure.
pub struct MioReactor {
    poll: mio::Poll,
    events: mio::Events,
}

impl MioReactor {
    pub fn new() -> io::Result<MioReactor> {
        Ok(MioReactor {
            poll: mio::Poll::new()?,
            events: mio::Events::with_capacity(64),
        })
    }

    fn mio_interest(interest: Interest) -> mio::Interest {
        match (interest.readable(), interest.writable()) {
            (true, true) => mio::Interest::READABLE | mio::Interest::WRITABLE,
            (false, true) => mio::Interest::WRITABLE,
            // registering with an empty mask is a caller bug; fall back to
            // read so the descriptor stays observable
            _ => mio::Interest::READABLE,
        }
    }
}

impl Reactor for MioReactor {
    fn watch(&mut self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), Token(token), Self::mio_interest(interest))
    }

    fn update(&mut self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        self.poll
            .registry()
            .reregister(&mut SourceFd(&fd), Token(token), Self::mio_interest(interest))
    }

    fn unwatch(&mut self, fd: RawFd) -> io::Result<()> {
        self.poll.registry().deregister(&mut SourceFd(&fd))
    }

    fn poll(&mut self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<()> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }
        for ev in self.events.iter() {
            let broken = ev.is_error() || ev.is_read_closed() || ev.is_write_closed();
            events.push(Event {
                token: ev.token().0,
                readable: ev.is_readable() || broken,
                writable: ev.is_writable() || broken,
            });
        }
        Ok(())
    }
}
