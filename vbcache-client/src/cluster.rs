// SPDX-License-Identifier: MIT
// Copyright (c) 2026 vbcache contributors – https://github.com/vbcache/vbcache

//! The router owning every server connection.
//!
//! Operations are spooled: each call encodes frames with fresh opaques,
//! routes them to the vbucket's master server, and returns. `execute` then
//! drives the reactor until every response (explicit or implicit) has been
//! delivered through the callbacks.

use std::any::Any;
use std::time::Duration;

use tracing::debug;
use vbcache_codec::{self as codec, Extras, Opcode};
use vbcache_core::{
    Authenticator, Callbacks, Error, Event, FilterVerdict, GrowBuf, KeySlot, PacketFilter,
    Reactor, Status, StorageOp, VbucketConfig,
};

use crate::sasl::PlainAuth;
use crate::server::{Ctx, Server};

const MAX_KEY_LEN: usize = 250;
const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn key_fault(key: &[u8]) -> Option<Status> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        Some(Status::Einval)
    } else {
        None
    }
}

pub struct Cluster<C: VbucketConfig, R: Reactor> {
    config: C,
    reactor: R,
    servers: Vec<Server>,
    seqno: u32,
    callbacks: Box<dyn Callbacks>,
    filter: Option<Box<dyn PacketFilter>>,
    authenticator: Box<dyn Authenticator>,
    cookie: Option<Box<dyn Any>>,
    scratch: GrowBuf,
}

impl<C: VbucketConfig, R: Reactor> Cluster<C, R> {
    /// Resolves every server in the config and starts the connection fan-out.
    /// Authentication defaults to PLAIN with the config's credentials when a
    /// user is set.
    pub fn new(config: C, reactor: R) -> Result<Cluster<C, R>, Error> {
        let authenticator: Box<dyn Authenticator> = Box::new(PlainAuth::new(
            config.user().unwrap_or(""),
            config.password().unwrap_or(""),
        ));
        let mut cluster = Cluster {
            servers: Vec::new(),
            seqno: 0,
            callbacks: Box::new(()),
            filter: None,
            authenticator,
            cookie: None,
            scratch: GrowBuf::new(),
            config,
            reactor,
        };
        cluster.connect_all()?;
        Ok(cluster)
    }

    fn connect_all(&mut self) -> Result<(), Error> {
        debug!("[cluster] connecting {} servers", self.config.server_count());
        for index in 0..self.config.server_count() {
            let mut server = Server::new(index, self.config.server_name(index))?;
            {
                let Cluster { reactor, callbacks, config, authenticator, .. } = self;
                let mut ctx = Ctx {
                    reactor,
                    callbacks: &mut **callbacks,
                    user: config.user(),
                    authenticator: &**authenticator,
                };
                server.start_connect(&mut ctx)?;
            }
            self.servers.push(server);
        }
        Ok(())
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn set_callbacks(&mut self, callbacks: Box<dyn Callbacks>) {
        self.callbacks = callbacks;
    }

    pub fn set_packet_filter(&mut self, filter: Box<dyn PacketFilter>) {
        self.filter = Some(filter);
    }

    pub fn set_authenticator(&mut self, authenticator: Box<dyn Authenticator>) {
        self.authenticator = authenticator;
    }

    pub fn set_cookie(&mut self, cookie: Box<dyn Any>) {
        self.cookie = Some(cookie);
    }

    pub fn cookie(&self) -> Option<&dyn Any> {
        self.cookie.as_deref()
    }

    pub fn cookie_mut(&mut self) -> Option<&mut dyn Any> {
        self.cookie.as_deref_mut()
    }

    /// Spools a quiet get per key. Misses are synthesized by the reconciler.
    pub fn mget<K: AsRef<[u8]>>(&mut self, keys: &[K]) -> Result<(), Error> {
        self.spool_get_batch(None, keys, None)
    }

    pub fn mget_by_key<K: AsRef<[u8]>>(&mut self, hashkey: &[u8], keys: &[K]) -> Result<(), Error> {
        self.spool_get_batch(Some(hashkey), keys, None)
    }

    /// Get-and-touch: refreshes each fetched item's expiry on the way out.
    pub fn mget_and_touch<K: AsRef<[u8]>>(&mut self, keys: &[K], expiry: u32) -> Result<(), Error> {
        self.spool_get_batch(None, keys, Some(expiry))
    }

    fn spool_get_batch<K: AsRef<[u8]>>(
        &mut self,
        hashkey: Option<&[u8]>,
        keys: &[K],
        expiry: Option<u32>,
    ) -> Result<(), Error> {
        let mut touched = vec![false; self.servers.len()];
        for key in keys {
            let key = key.as_ref();
            if let Some(status) = key_fault(key) {
                self.callbacks.get(status, key, &[], 0, 0);
                continue;
            }
            let slot = self.locate(hashkey, key)?;
            if self.servers[slot.server].is_failed() {
                // a dead server cannot distinguish a miss; report it as one,
                // matching the teardown purge
                self.callbacks.get(Status::KeyEnoent, key, &[], 0, 0);
                continue;
            }
            let opaque = self.next_seqno();
            let (opcode, extras) = match expiry {
                None => (Opcode::Getq, Extras::None),
                Some(exp) => (Opcode::Gatq, Extras::Touch { expiry: exp }),
            };
            let req = codec::Request {
                opcode,
                vbucket: slot.vbucket,
                opaque,
                cas: 0,
                extras,
                key,
                value: &[],
            };
            self.submit(slot.server, &req, true)?;
            touched[slot.server] = true;
        }
        // quiet gets only resolve when something non-quiet follows them;
        // terminate the batch on each touched server with a NOOP
        for index in 0..touched.len() {
            if touched[index] {
                let opaque = self.next_seqno();
                let req = codec::Request {
                    opcode: Opcode::Noop,
                    vbucket: 0,
                    opaque,
                    cas: 0,
                    extras: Extras::None,
                    key: &[],
                    value: &[],
                };
                self.submit(index, &req, true)?;
            }
        }
        Ok(())
    }

    pub fn store(
        &mut self,
        op: StorageOp,
        key: &[u8],
        value: &[u8],
        flags: u32,
        expiry: u32,
        cas: u64,
    ) -> Result<(), Error> {
        self.store_by_key(None, op, key, value, flags, expiry, cas)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn store_by_key(
        &mut self,
        hashkey: Option<&[u8]>,
        op: StorageOp,
        key: &[u8],
        value: &[u8],
        flags: u32,
        expiry: u32,
        cas: u64,
    ) -> Result<(), Error> {
        if let Some(status) = key_fault(key) {
            self.callbacks.store(status, op, key, 0);
            return Ok(());
        }
        let slot = self.locate(hashkey, key)?;
        if self.servers[slot.server].is_failed() {
            self.callbacks.store(Status::NetworkError, op, key, 0);
            return Ok(());
        }
        let opaque = self.next_seqno();
        let opcode = match op {
            StorageOp::Set => Opcode::Set,
            StorageOp::Add => Opcode::Add,
            StorageOp::Replace => Opcode::Replace,
            StorageOp::Append => Opcode::Append,
            StorageOp::Prepend => Opcode::Prepend,
        };
        let extras = match op {
            StorageOp::Set | StorageOp::Add | StorageOp::Replace => {
                Extras::Store { flags, expiry }
            }
            StorageOp::Append | StorageOp::Prepend => Extras::None,
        };
        let req = codec::Request {
            opcode,
            vbucket: slot.vbucket,
            opaque,
            cas,
            extras,
            key,
            value,
        };
        self.submit(slot.server, &req, true)
    }

    /// Spools a counter bump: INCR for a non-negative delta, DECR otherwise.
    /// Without `create`, the wire expiry is all-ones, which the server reads
    /// as "do not create the key".
    pub fn arithmetic(
        &mut self,
        key: &[u8],
        delta: i64,
        expiry: u32,
        create: bool,
        initial: u64,
    ) -> Result<(), Error> {
        self.arithmetic_by_key(None, key, delta, expiry, create, initial)
    }

    pub fn arithmetic_by_key(
        &mut self,
        hashkey: Option<&[u8]>,
        key: &[u8],
        delta: i64,
        expiry: u32,
        create: bool,
        initial: u64,
    ) -> Result<(), Error> {
        if let Some(status) = key_fault(key) {
            self.callbacks.arithmetic(status, key, 0, 0);
            return Ok(());
        }
        let slot = self.locate(hashkey, key)?;
        if self.servers[slot.server].is_failed() {
            self.callbacks.arithmetic(Status::NetworkError, key, 0, 0);
            return Ok(());
        }
        let opaque = self.next_seqno();
        let opcode = if delta >= 0 { Opcode::Increment } else { Opcode::Decrement };
        let wire_expiry = if create { expiry } else { 0xffff_ffff };
        let req = codec::Request {
            opcode,
            vbucket: slot.vbucket,
            opaque,
            cas: 0,
            extras: Extras::Arithmetic {
                delta: delta.unsigned_abs(),
                initial,
                expiry: wire_expiry,
            },
            key,
            value: &[],
        };
        self.submit(slot.server, &req, true)
    }

    pub fn remove(&mut self, key: &[u8], cas: u64) -> Result<(), Error> {
        self.remove_by_key(None, key, cas)
    }

    pub fn remove_by_key(&mut self, hashkey: Option<&[u8]>, key: &[u8], cas: u64) -> Result<(), Error> {
        if let Some(status) = key_fault(key) {
            self.callbacks.remove(status, key);
            return Ok(());
        }
        let slot = self.locate(hashkey, key)?;
        if self.servers[slot.server].is_failed() {
            self.callbacks.remove(Status::NetworkError, key);
            return Ok(());
        }
        let opaque = self.next_seqno();
        let req = codec::Request {
            opcode: Opcode::Delete,
            vbucket: slot.vbucket,
            opaque,
            cas,
            extras: Extras::None,
            key,
            value: &[],
        };
        self.submit(slot.server, &req, true)
    }

    /// Asks every live server to start streaming TAP events, with the
    /// backfill flag and a zero backfill date so stored items replay before
    /// live mutations; deliveries arrive on the tap callbacks during
    /// `execute`.
    pub fn tap_cluster(&mut self) -> Result<(), Error> {
        let backfill_date = 0u64.to_be_bytes();
        for index in 0..self.servers.len() {
            if self.servers[index].is_failed() {
                continue;
            }
            let opaque = self.next_seqno();
            let req = codec::Request {
                opcode: Opcode::TapConnect,
                vbucket: 0,
                opaque,
                cas: 0,
                extras: Extras::Flags { flags: codec::TAP_CONNECT_BACKFILL },
                key: &[],
                value: &backfill_date,
            };
            self.submit(index, &req, false)?;
        }
        Ok(())
    }

    /// Drives the reactor until every server is drained: no logged request
    /// awaiting a response, nothing buffered to send, or failed.
    pub fn execute(&mut self) -> Result<(), Error> {
        let mut events: Vec<Event> = Vec::new();
        while !self.is_quiescent() {
            events.clear();
            self.reactor.poll(&mut events, Some(POLL_INTERVAL))?;
            for ev in &events {
                if ev.token >= self.servers.len() {
                    continue;
                }
                let Cluster { servers, reactor, callbacks, config, authenticator, .. } = self;
                let mut ctx = Ctx {
                    reactor,
                    callbacks: &mut **callbacks,
                    user: config.user(),
                    authenticator: &**authenticator,
                };
                servers[ev.token].on_event(&mut ctx, ev.readable, ev.writable)?;
            }
        }
        Ok(())
    }

    /// Force-closes one backend: outstanding quiet gets report misses, other
    /// in-flight operations report a network error.
    pub fn shutdown_server(&mut self, index: usize) {
        if index >= self.servers.len() {
            return;
        }
        let Cluster { servers, reactor, callbacks, config, authenticator, .. } = self;
        let mut ctx = Ctx {
            reactor,
            callbacks: &mut **callbacks,
            user: config.user(),
            authenticator: &**authenticator,
        };
        servers[index].shutdown(&mut ctx);
    }

    fn is_quiescent(&self) -> bool {
        self.servers.iter().all(|s| s.is_idle())
    }

    fn locate(&self, hashkey: Option<&[u8]>, key: &[u8]) -> Result<KeySlot, Error> {
        self.config
            .locate(hashkey.unwrap_or(key))
            .ok_or(Error::NoServerForKey)
    }

    fn next_seqno(&mut self) -> u32 {
        let seqno = self.seqno;
        self.seqno = self.seqno.wrapping_add(1);
        seqno
    }

    fn submit(&mut self, index: usize, req: &codec::Request<'_>, log: bool) -> Result<(), Error> {
        let Cluster { servers, reactor, filter, scratch, .. } = self;
        scratch.clear();
        req.encode_into(scratch)?;
        let server = &mut servers[index];
        let verdict = match filter {
            Some(f) => f.filter(scratch.as_slice()),
            None => FilterVerdict::Pass,
        };
        let log_frame = if log { Some(scratch.as_slice()) } else { None };
        match verdict {
            FilterVerdict::Pass => server.enqueue(Some(scratch.as_slice()), log_frame)?,
            // suppressed on the wire, but the opaque still lines up in the log
            FilterVerdict::Drop => server.enqueue(None, log_frame)?,
            // the rewrite goes out; correlation stays on the original
            FilterVerdict::Replace(bytes) => server.enqueue(Some(&bytes), log_frame)?,
        }
        server.poke_send(reactor)
    }
}

impl<C: VbucketConfig, R: Reactor> Drop for Cluster<C, R> {
    fn drop(&mut self) {
        for index in 0..self.servers.len() {
            self.shutdown_server(index);
        }
    }
}
