// SPDX-License-Identifier: MIT
// Copyright (c) 2026 vbcache contributors – https://github.com/vbcache/vbcache

use std::cell::RefCell;
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Duration;

use vbcache_core::{Callbacks, Event, Interest, Reactor, Status, StorageOp};

/// Collects every callback invocation for assertions.
#[derive(Debug, Default)]
pub(crate) struct Record {
    pub gets: Vec<(Status, Vec<u8>, Vec<u8>, u32, u64)>,
    pub stores: Vec<(Status, StorageOp, Vec<u8>, u64)>,
    pub counters: Vec<(Status, Vec<u8>, u64, u64)>,
    pub removes: Vec<(Status, Vec<u8>)>,
    pub tap_mutations: Vec<(Vec<u8>, Vec<u8>, u32, u32, u64)>,
    pub tap_deletes: Vec<(Vec<u8>, u64)>,
}

impl Callbacks for Record {
    fn get(&mut self, status: Status, key: &[u8], value: &[u8], flags: u32, cas: u64) {
        self.gets.push((status, key.to_vec(), value.to_vec(), flags, cas));
    }

    fn store(&mut self, status: Status, op: StorageOp, key: &[u8], cas: u64) {
        self.stores.push((status, op, key.to_vec(), cas));
    }

    fn arithmetic(&mut self, status: Status, key: &[u8], value: u64, cas: u64) {
        self.counters.push((status, key.to_vec(), value, cas));
    }

    fn remove(&mut self, status: Status, key: &[u8]) {
        self.removes.push((status, key.to_vec()));
    }

    fn tap_mutation(&mut self, key: &[u8], value: &[u8], flags: u32, expiry: u32, cas: u64) {
        self.tap_mutations
            .push((key.to_vec(), value.to_vec(), flags, expiry, cas));
    }

    fn tap_deletion(&mut self, key: &[u8], cas: u64) {
        self.tap_deletes.push((key.to_vec(), cas));
    }
}

/// Same recorder behind an `Rc`, for handing to a `Cluster` while keeping a
/// reading handle.
#[derive(Clone, Default)]
pub(crate) struct SharedRecord(pub Rc<RefCell<Record>>);

impl Callbacks for SharedRecord {
    fn get(&mut self, status: Status, key: &[u8], value: &[u8], flags: u32, cas: u64) {
        self.0.borrow_mut().get(status, key, value, flags, cas);
    }

    fn store(&mut self, status: Status, op: StorageOp, key: &[u8], cas: u64) {
        self.0.borrow_mut().store(status, op, key, cas);
    }

    fn arithmetic(&mut self, status: Status, key: &[u8], value: u64, cas: u64) {
        self.0.borrow_mut().arithmetic(status, key, value, cas);
    }

    fn remove(&mut self, status: Status, key: &[u8]) {
        self.0.borrow_mut().remove(status, key);
    }

    fn tap_mutation(&mut self, key: &[u8], value: &[u8], flags: u32, expiry: u32, cas: u64) {
        self.0.borrow_mut().tap_mutation(key, value, flags, expiry, cas);
    }

    fn tap_deletion(&mut self, key: &[u8], cas: u64) {
        self.0.borrow_mut().tap_deletion(key, cas);
    }
}

/// Reactor stub for state-machine tests that never touch a socket.
pub(crate) struct NoopReactor;

impl Reactor for NoopReactor {
    fn watch(&mut self, _fd: RawFd, _token: usize, _interest: Interest) -> io::Result<()> {
        Ok(())
    }

    fn update(&mut self, _fd: RawFd, _token: usize, _interest: Interest) -> io::Result<()> {
        Ok(())
    }

    fn unwatch(&mut self, _fd: RawFd) -> io::Result<()> {
        Ok(())
    }

    fn poll(&mut self, _events: &mut Vec<Event>, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }
}
