// SPDX-License-Identifier: MIT
// Copyright (c) 2026 vbcache contributors – https://github.com/vbcache/vbcache

//! Per-backend connection state machine.
//!
//! A server walks `Resolving → Connecting → TcpReady → (SASL) → Ready`, with
//! `Failed` terminal. Until it reaches `Ready`, outbound data frames gather
//! in `pending`; authentication traffic alone may touch `output`. Inbound
//! bytes are framed out of `input` and correlated against `cmd_log`, which
//! holds the raw request frames still awaiting a response in opaque order.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::unix::io::AsRawFd;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{debug, trace, warn};
use vbcache_codec::{self as codec, Opcode};
use vbcache_core::{
    Authenticator, Binding, Callbacks, Error, GrowBuf, Interest, Reactor, SaslClient, Status,
    StorageOp,
};

const READ_CHUNK: usize = 8192;

/// Serial-number ordering on opaques, so correlation survives the u32 wrap.
pub(crate) fn opaque_precedes(a: u32, b: u32) -> bool {
    a != b && b.wrapping_sub(a) < 1 << 31
}

/// Everything a server needs from its owner while handling one event.
pub(crate) struct Ctx<'a> {
    pub reactor: &'a mut dyn Reactor,
    pub callbacks: &'a mut dyn Callbacks,
    pub user: Option<&'a str>,
    pub authenticator: &'a dyn Authenticator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Resolving,
    Connecting,
    TcpReady,
    SaslListing,
    SaslAuthing,
    SaslStepping,
    Ready,
    Failed,
}

pub(crate) struct Server {
    index: usize,
    hostname: String,
    port: u16,
    addrs: Vec<SocketAddr>,
    next_addr: usize,
    sock: Option<Socket>,
    ev_flags: Interest,
    state: State,
    sasl: Option<Box<dyn SaslClient>>,
    sasl_mech: Option<String>,
    output: GrowBuf,
    pending: GrowBuf,
    cmd_log: GrowBuf,
    input: GrowBuf,
}

impl Server {
    pub(crate) fn new(index: usize, name: &str) -> Result<Server, Error> {
        let (host, port) = match name.rsplit_once(':') {
            Some((h, p)) => match p.parse::<u16>() {
                Ok(port) => (h.to_string(), port),
                Err(_) => return Err(Error::UnknownHost(name.to_string())),
            },
            None => return Err(Error::UnknownHost(name.to_string())),
        };
        let addrs: Vec<SocketAddr> = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|_| Error::UnknownHost(name.to_string()))?
            .collect();
        if addrs.is_empty() {
            return Err(Error::UnknownHost(name.to_string()));
        }
        Ok(Server::with_resolved(index, host, port, addrs))
    }

    fn with_resolved(index: usize, hostname: String, port: u16, addrs: Vec<SocketAddr>) -> Server {
        Server {
            index,
            hostname,
            port,
            addrs,
            next_addr: 0,
            sock: None,
            ev_flags: Interest::NONE,
            state: State::Resolving,
            sasl: None,
            sasl_mech: None,
            output: GrowBuf::new(),
            pending: GrowBuf::new(),
            cmd_log: GrowBuf::new(),
            input: GrowBuf::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_addrs(index: usize, addrs: Vec<SocketAddr>) -> Server {
        Server::with_resolved(index, "test".to_string(), 0, addrs)
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.state == State::Failed
    }

    /// True when nothing remains for `execute` to drive here.
    pub(crate) fn is_idle(&self) -> bool {
        self.state == State::Failed
            || (self.cmd_log.is_empty() && self.output.is_empty() && self.pending.is_empty())
    }

    /// Queues an already-encoded frame. `send` lands on the wire (via
    /// `pending` until the server is ready); `log` registers the frame for
    /// response correlation. A filtered-out frame passes `send: None` and
    /// keeps its log entry so later opaques still line up.
    pub(crate) fn enqueue(&mut self, send: Option<&[u8]>, log: Option<&[u8]>) -> Result<(), Error> {
        if let Some(frame) = log {
            self.cmd_log.append(frame)?;
        }
        if let Some(frame) = send {
            if self.state == State::Ready {
                self.output.append(frame)?;
            } else {
                self.pending.append(frame)?;
            }
        }
        Ok(())
    }

    /// Ensures WRITE interest when there are bytes to move.
    pub(crate) fn poke_send(&mut self, reactor: &mut dyn Reactor) -> Result<(), Error> {
        if self.state == State::Ready && !self.output.is_empty() {
            self.update_interest(reactor, Interest::READ | Interest::WRITE)?;
        }
        Ok(())
    }

    pub(crate) fn start_connect(&mut self, ctx: &mut Ctx<'_>) -> Result<(), Error> {
        self.state = State::Connecting;
        self.connect_next(ctx)
    }

    pub(crate) fn on_event(
        &mut self,
        ctx: &mut Ctx<'_>,
        readable: bool,
        writable: bool,
    ) -> Result<(), Error> {
        match self.state {
            State::Resolving | State::TcpReady | State::Failed => Ok(()),
            State::Connecting => {
                if readable || writable {
                    if !self.try_connect(ctx)? {
                        self.drop_socket(ctx.reactor);
                        self.next_addr += 1;
                        self.connect_next(ctx)?;
                    }
                }
                Ok(())
            }
            _ => {
                if readable {
                    self.read_ready(ctx)?;
                }
                if self.state != State::Failed && writable {
                    self.write_ready(ctx)?;
                }
                Ok(())
            }
        }
    }

    /// Deliberate teardown: every outstanding quiet get reports a miss and
    /// every other in-flight operation reports a network error, so no caller
    /// callback is lost.
    pub(crate) fn shutdown(&mut self, ctx: &mut Ctx<'_>) {
        if self.state == State::Failed {
            return;
        }
        debug!("[server {}] shutting down", self.index);
        self.teardown(ctx, Status::NetworkError);
    }

    fn connect_next(&mut self, ctx: &mut Ctx<'_>) -> Result<(), Error> {
        while self.next_addr < self.addrs.len() {
            let addr = self.addrs[self.next_addr];
            let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
            let sock = match Socket::new(domain, Type::STREAM, Some(Protocol::TCP)) {
                Ok(s) => s,
                Err(e) => {
                    trace!("[server {}] socket for {} failed: {}", self.index, addr, e);
                    self.next_addr += 1;
                    continue;
                }
            };
            if let Err(e) = sock.set_nonblocking(true) {
                trace!("[server {}] cannot make {} non-blocking: {}", self.index, addr, e);
                self.next_addr += 1;
                continue;
            }
            debug!("[server {}] connecting to {}", self.index, addr);
            self.sock = Some(sock);
            if self.try_connect(ctx)? {
                return Ok(());
            }
            self.drop_socket(ctx.reactor);
            self.next_addr += 1;
        }
        warn!(
            "[server {}] {}:{} has no reachable address",
            self.index, self.hostname, self.port
        );
        self.fail(ctx, Status::NetworkError)
    }

    /// One connect attempt against the current candidate. `Ok(false)` means
    /// the candidate is dead and the caller should advance.
    fn try_connect(&mut self, ctx: &mut Ctx<'_>) -> Result<bool, Error> {
        if self.next_addr >= self.addrs.len() {
            return Ok(false);
        }
        loop {
            let res = {
                let Some(sock) = self.sock.as_ref() else { return Ok(false) };
                sock.connect(&SockAddr::from(self.addrs[self.next_addr]))
            };
            match res {
                Ok(()) => {
                    self.socket_connected(ctx)?;
                    return Ok(true);
                }
                Err(e) => match e.raw_os_error() {
                    Some(libc::EINTR) => continue,
                    Some(libc::EISCONN) => {
                        self.socket_connected(ctx)?;
                        return Ok(true);
                    }
                    // first call: wait for writability, then connect again
                    Some(libc::EINPROGRESS) => {
                        self.update_interest(ctx.reactor, Interest::WRITE)?;
                        return Ok(true);
                    }
                    Some(libc::EALREADY) => return Ok(true),
                    _ => {
                        trace!(
                            "[server {}] connect {} failed: {}",
                            self.index,
                            self.addrs[self.next_addr],
                            e
                        );
                        return Ok(false);
                    }
                },
            }
        }
    }

    fn socket_connected(&mut self, ctx: &mut Ctx<'_>) -> Result<(), Error> {
        self.state = State::TcpReady;
        let binding = self.binding();
        debug!(
            "[server {}] tcp established ({} -> {})",
            self.index, binding.local, binding.remote
        );
        match ctx.user {
            None => self.server_ready(ctx.reactor),
            Some(_) => {
                self.sasl = Some(ctx.authenticator.begin(&binding));
                self.state = State::SaslListing;
                let req = codec::Request {
                    opcode: Opcode::SaslListMechs,
                    vbucket: 0,
                    opaque: 0,
                    cas: 0,
                    extras: codec::Extras::None,
                    key: &[],
                    value: &[],
                };
                self.enqueue_sasl(&req)?;
                self.update_interest(ctx.reactor, Interest::READ | Interest::WRITE)
            }
        }
    }

    /// Endpoint identities for SASL channel binding, both sides numeric.
    fn binding(&self) -> Binding {
        fn endpoint(addr: Option<SocketAddr>) -> String {
            match addr {
                Some(a) => format!("{};{}", a.ip(), a.port()),
                None => String::new(),
            }
        }
        let (local, remote) = match self.sock.as_ref() {
            Some(sock) => (
                endpoint(sock.local_addr().ok().and_then(|a| a.as_socket())),
                endpoint(sock.peer_addr().ok().and_then(|a| a.as_socket())),
            ),
            None => (String::new(), String::new()),
        };
        Binding {
            host: self.hostname.clone(),
            local,
            remote,
        }
    }

    /// The connection is usable: splice everything queued while connecting
    /// onto the outbound stream and watch both directions.
    fn server_ready(&mut self, reactor: &mut dyn Reactor) -> Result<(), Error> {
        debug!(
            "[server {}] ready, {} pending bytes to flush",
            self.index,
            self.pending.len()
        );
        self.state = State::Ready;
        self.sasl = None;
        self.sasl_mech = None;
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            self.output.append(pending.as_slice())?;
        }
        self.update_interest(reactor, Interest::READ | Interest::WRITE)
    }

    /// Authentication traffic goes straight to `output`; it must flow before
    /// the server counts as ready.
    fn enqueue_sasl(&mut self, req: &codec::Request<'_>) -> Result<(), Error> {
        req.encode_into(&mut self.output)
    }

    fn update_interest(&mut self, reactor: &mut dyn Reactor, interest: Interest) -> Result<(), Error> {
        let Some(sock) = self.sock.as_ref() else { return Ok(()) };
        let fd = sock.as_raw_fd();
        if self.ev_flags.is_empty() {
            if interest.is_empty() {
                return Ok(());
            }
            reactor.watch(fd, self.index, interest)?;
        } else if interest.is_empty() {
            reactor.unwatch(fd)?;
        } else if interest != self.ev_flags {
            reactor.update(fd, self.index, interest)?;
        }
        self.ev_flags = interest;
        Ok(())
    }

    fn write_ready(&mut self, ctx: &mut Ctx<'_>) -> Result<(), Error> {
        let mut fatal = false;
        loop {
            if self.output.is_empty() {
                break;
            }
            let res = {
                let Some(sock) = self.sock.as_ref() else { return Ok(()) };
                (&mut (&*sock)).write(self.output.as_slice())
            };
            match res {
                Ok(0) => {
                    fatal = true;
                    break;
                }
                Ok(n) => {
                    trace!("[server {}] wrote {} bytes", self.index, n);
                    self.output.consume(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("[server {}] write failed: {}", self.index, e);
                    fatal = true;
                    break;
                }
            }
        }
        if fatal {
            return self.fail(ctx, Status::NetworkError);
        }
        if self.output.is_empty() {
            self.update_interest(ctx.reactor, Interest::READ)?;
        }
        Ok(())
    }

    fn read_ready(&mut self, ctx: &mut Ctx<'_>) -> Result<(), Error> {
        let mut closed = false;
        loop {
            let start = self.input.len();
            let res = {
                let Some(sock) = self.sock.as_ref() else { return Ok(()) };
                let slot = self.input.read_slot(READ_CHUNK)?;
                (&mut (&*sock)).read(slot)
            };
            match res {
                Ok(0) => {
                    self.input.truncate(start);
                    closed = true;
                    break;
                }
                Ok(n) => {
                    trace!("[server {}] read {} bytes", self.index, n);
                    self.input.truncate(start + n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.input.truncate(start);
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    self.input.truncate(start);
                    continue;
                }
                Err(e) => {
                    self.input.truncate(start);
                    warn!("[server {}] read failed: {}", self.index, e);
                    closed = true;
                    break;
                }
            }
        }
        self.process_input(ctx)?;
        if closed && self.state != State::Failed {
            self.fail(ctx, Status::NetworkError)?;
        }
        Ok(())
    }

    /// Frames and dispatches everything complete at the front of `input`.
    fn process_input(&mut self, ctx: &mut Ctx<'_>) -> Result<(), Error> {
        let mut consumed = 0;
        loop {
            let next = {
                let buf = &self.input.as_slice()[consumed..];
                match codec::frame_len(buf) {
                    Some(need) if buf.len() >= need => Some(need),
                    _ => None,
                }
            };
            let Some(need) = next else { break };
            self.handle_frame(ctx, consumed, need)?;
            if self.state == State::Failed {
                // teardown already purged the buffers
                return Ok(());
            }
            consumed += need;
        }
        if consumed > 0 {
            self.input.consume(consumed);
        }
        Ok(())
    }

    fn handle_frame(&mut self, ctx: &mut Ctx<'_>, at: usize, len: usize) -> Result<(), Error> {
        let magic = self.input.as_slice()[at];
        match magic {
            codec::MAGIC_RESPONSE => self.handle_response(ctx, at, len),
            // request magic from the server side carries TAP stream events
            codec::MAGIC_REQUEST => self.handle_server_request(ctx, at, len),
            other => {
                warn!("[server {}] unknown magic {:#04x}", self.index, other);
                self.fail(ctx, Status::ProtocolError)
            }
        }
    }

    fn handle_response(&mut self, ctx: &mut Ctx<'_>, at: usize, len: usize) -> Result<(), Error> {
        let parsed = {
            let frame = &self.input.as_slice()[at..at + len];
            codec::parse_response(frame).map(|r| (r.opcode, r.opaque))
        };
        let (opcode, opaque) = match parsed {
            Ok(p) => p,
            Err(e) => {
                warn!("[server {}] bad response frame: {}", self.index, e);
                return self.fail(ctx, Status::ProtocolError);
            }
        };
        match Opcode::from_wire(opcode) {
            Some(op) if op.is_sasl() => self.handle_sasl_response(ctx, at, len, op),
            _ => self.handle_data_response(ctx, at, len, opaque),
        }
    }

    fn handle_data_response(
        &mut self,
        ctx: &mut Ctx<'_>,
        at: usize,
        len: usize,
        opaque: u32,
    ) -> Result<(), Error> {
        if !self.purge_implicit(ctx.callbacks, opaque) {
            warn!(
                "[server {}] non-quiet request skipped by response opaque {}",
                self.index, opaque
            );
            return self.fail(ctx, Status::ProtocolError);
        }
        // after the purge, the head of the log must be the matching request
        let matched = {
            let log = self.cmd_log.as_slice();
            match codec::frame_len(log) {
                Some(need) if log.len() >= need => match codec::parse_request(&log[..need]) {
                    Ok(req) if req.opaque == opaque => Some(log[..need].to_vec()),
                    _ => None,
                },
                _ => None,
            }
        };
        let Some(request) = matched else {
            warn!(
                "[server {}] response opaque {} matches no logged request",
                self.index, opaque
            );
            return self.fail(ctx, Status::ProtocolError);
        };
        self.cmd_log.consume(request.len());
        if !self.dispatch_response(ctx.callbacks, &request, at, len) {
            return self.fail(ctx, Status::ProtocolError);
        }
        Ok(())
    }

    /// Fires the completion callback selected by the logged request's opcode.
    /// Returns false on a request/response mismatch the protocol forbids.
    fn dispatch_response(
        &self,
        cb: &mut dyn Callbacks,
        request: &[u8],
        at: usize,
        len: usize,
    ) -> bool {
        let Ok(req) = codec::parse_request(request) else { return false };
        let Ok(resp) = codec::parse_response(&self.input.as_slice()[at..at + len]) else {
            return false;
        };
        if resp.opcode != req.opcode {
            return false;
        }
        let Some(op) = Opcode::from_wire(req.opcode) else { return false };
        let status = codec::status_from_wire(resp.status);
        // quiet-get responses omit the key; recover it from the request
        let key = if resp.key.is_empty() { req.key } else { resp.key };
        match op {
            Opcode::Getq | Opcode::Gatq => cb.get(
                status,
                key,
                resp.value,
                codec::response_flags(resp.extras),
                resp.cas,
            ),
            Opcode::Set => cb.store(status, StorageOp::Set, key, resp.cas),
            Opcode::Add => cb.store(status, StorageOp::Add, key, resp.cas),
            Opcode::Replace => cb.store(status, StorageOp::Replace, key, resp.cas),
            Opcode::Append => cb.store(status, StorageOp::Append, key, resp.cas),
            Opcode::Prepend => cb.store(status, StorageOp::Prepend, key, resp.cas),
            Opcode::Increment | Opcode::Decrement => {
                cb.arithmetic(status, key, codec::response_counter(resp.value), resp.cas)
            }
            Opcode::Delete => cb.remove(status, key),
            // batch terminator, nothing to report
            Opcode::Noop => {}
            _ => return false,
        }
        true
    }

    fn handle_sasl_response(
        &mut self,
        ctx: &mut Ctx<'_>,
        at: usize,
        len: usize,
        op: Opcode,
    ) -> Result<(), Error> {
        let (status, value) = {
            let frame = &self.input.as_slice()[at..at + len];
            match codec::parse_response(frame) {
                Ok(r) => (r.status, r.value.to_vec()),
                Err(_) => return self.fail(ctx, Status::ProtocolError),
            }
        };
        match (self.state, op) {
            (State::SaslListing, Opcode::SaslListMechs) => {
                if status != codec::wire::SUCCESS {
                    return self.fail(ctx, Status::AuthError);
                }
                let mechs = String::from_utf8_lossy(&value).into_owned();
                trace!("[server {}] server mechanisms: {}", self.index, mechs);
                let started = match self.sasl.as_mut() {
                    Some(sasl) => sasl.start(&mechs),
                    None => return self.fail(ctx, Status::ProtocolError),
                };
                match started {
                    Ok((mech, initial)) => {
                        debug!("[server {}] authenticating with {}", self.index, mech);
                        let req = codec::Request {
                            opcode: Opcode::SaslAuth,
                            vbucket: 0,
                            opaque: 0,
                            cas: 0,
                            extras: codec::Extras::None,
                            key: mech.as_bytes(),
                            value: &initial,
                        };
                        self.enqueue_sasl(&req)?;
                        self.sasl_mech = Some(mech);
                        self.state = State::SaslAuthing;
                        self.update_interest(ctx.reactor, Interest::READ | Interest::WRITE)
                    }
                    Err(e) => {
                        warn!("[server {}] cannot authenticate: {}", self.index, e);
                        self.fail(ctx, Status::AuthError)
                    }
                }
            }
            (State::SaslAuthing, Opcode::SaslAuth) | (State::SaslStepping, Opcode::SaslStep) => {
                match status {
                    codec::wire::SUCCESS => {
                        debug!("[server {}] authenticated", self.index);
                        self.server_ready(ctx.reactor)
                    }
                    codec::wire::AUTH_CONTINUE => {
                        let stepped = match self.sasl.as_mut() {
                            Some(sasl) => sasl.step(&value),
                            None => return self.fail(ctx, Status::ProtocolError),
                        };
                        match stepped {
                            Ok(response) => {
                                let mech = self.sasl_mech.clone().unwrap_or_default();
                                let req = codec::Request {
                                    opcode: Opcode::SaslStep,
                                    vbucket: 0,
                                    opaque: 0,
                                    cas: 0,
                                    extras: codec::Extras::None,
                                    key: mech.as_bytes(),
                                    value: &response,
                                };
                                self.enqueue_sasl(&req)?;
                                self.state = State::SaslStepping;
                                self.update_interest(ctx.reactor, Interest::READ | Interest::WRITE)
                            }
                            Err(e) => {
                                warn!("[server {}] sasl step failed: {}", self.index, e);
                                self.fail(ctx, Status::AuthError)
                            }
                        }
                    }
                    _ => {
                        warn!("[server {}] authentication rejected", self.index);
                        self.fail(ctx, Status::AuthError)
                    }
                }
            }
            _ => self.fail(ctx, Status::ProtocolError),
        }
    }

    fn handle_server_request(&mut self, ctx: &mut Ctx<'_>, at: usize, len: usize) -> Result<(), Error> {
        let ok = {
            let frame = &self.input.as_slice()[at..at + len];
            match codec::parse_request(frame) {
                Ok(req) => match Opcode::from_wire(req.opcode) {
                    Some(Opcode::TapMutation) => {
                        let (flags, expiry) = codec::tap_item_meta(req.extras);
                        ctx.callbacks.tap_mutation(req.key, req.value, flags, expiry, req.cas);
                        true
                    }
                    Some(Opcode::TapDelete) => {
                        ctx.callbacks.tap_deletion(req.key, req.cas);
                        true
                    }
                    Some(Opcode::TapFlush) => {
                        ctx.callbacks.tap_flush();
                        true
                    }
                    Some(Opcode::TapOpaque) => {
                        ctx.callbacks.tap_opaque();
                        true
                    }
                    _ => false,
                },
                Err(_) => false,
            }
        };
        if ok {
            Ok(())
        } else {
            warn!("[server {}] unexpected server-side request", self.index);
            self.fail(ctx, Status::ProtocolError)
        }
    }

    /// The quiet-get reconciler. A response for `upto` means every logged
    /// request with an earlier opaque was answered or silently skipped;
    /// skipped quiet gets are misses. Returns false when the skipped prefix
    /// holds an opcode that must always be answered.
    fn purge_implicit(&mut self, cb: &mut dyn Callbacks, upto: u32) -> bool {
        loop {
            let consumed = {
                let log = self.cmd_log.as_slice();
                let Some(need) = codec::frame_len(log) else { return true };
                if log.len() < need {
                    return true;
                }
                let Ok(req) = codec::parse_request(&log[..need]) else { return false };
                if !opaque_precedes(req.opaque, upto) {
                    return true;
                }
                match Opcode::from_wire(req.opcode) {
                    Some(op) if op.is_quiet_get() => {
                        trace!("[server {}] opaque {} is an implicit miss", self.index, req.opaque);
                        cb.get(Status::KeyEnoent, req.key, &[], 0, 0);
                        need
                    }
                    _ => return false,
                }
            };
            self.cmd_log.consume(consumed);
        }
    }

    /// Unconditional purge for teardown: quiet gets report misses, anything
    /// else reports `status` through its own callback.
    fn purge_all(&mut self, cb: &mut dyn Callbacks, status: Status) {
        loop {
            let consumed = {
                let log = self.cmd_log.as_slice();
                let Some(need) = codec::frame_len(log) else { break };
                if log.len() < need {
                    break;
                }
                let Ok(req) = codec::parse_request(&log[..need]) else { break };
                match Opcode::from_wire(req.opcode) {
                    Some(Opcode::Getq) | Some(Opcode::Gatq) => {
                        cb.get(Status::KeyEnoent, req.key, &[], 0, 0)
                    }
                    Some(Opcode::Set) => cb.store(status, StorageOp::Set, req.key, 0),
                    Some(Opcode::Add) => cb.store(status, StorageOp::Add, req.key, 0),
                    Some(Opcode::Replace) => cb.store(status, StorageOp::Replace, req.key, 0),
                    Some(Opcode::Append) => cb.store(status, StorageOp::Append, req.key, 0),
                    Some(Opcode::Prepend) => cb.store(status, StorageOp::Prepend, req.key, 0),
                    Some(Opcode::Increment) | Some(Opcode::Decrement) => {
                        cb.arithmetic(status, req.key, 0, 0)
                    }
                    Some(Opcode::Delete) => cb.remove(status, req.key),
                    _ => {}
                }
                need
            };
            self.cmd_log.consume(consumed);
        }
        self.cmd_log.clear();
        self.output.clear();
        self.pending.clear();
        self.input.clear();
    }

    fn fail(&mut self, ctx: &mut Ctx<'_>, status: Status) -> Result<(), Error> {
        if self.state == State::Failed {
            return Ok(());
        }
        warn!(
            "[server {}] {}:{} failed ({})",
            self.index, self.hostname, self.port, status
        );
        self.teardown(ctx, status);
        Ok(())
    }

    fn teardown(&mut self, ctx: &mut Ctx<'_>, status: Status) {
        self.state = State::Failed;
        self.drop_socket(ctx.reactor);
        self.sasl = None;
        self.sasl_mech = None;
        self.purge_all(ctx.callbacks, status);
    }

    fn drop_socket(&mut self, reactor: &mut dyn Reactor) {
        if let Some(sock) = self.sock.take() {
            if !self.ev_flags.is_empty() {
                if let Err(e) = reactor.unwatch(sock.as_raw_fd()) {
                    debug!("[server {}] deregister failed: {}", self.index, e);
                }
            }
        }
        self.ev_flags = Interest::NONE;
    }
}
