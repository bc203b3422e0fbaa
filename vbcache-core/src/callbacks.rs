// SPDX-License-Identifier: MIT
// Copyright (c) 2026 vbcache contributors – https://github.com/vbcache/vbcache

use crate::error::Status;

/// Which storage constraint an operation carries on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
}

/// Completion handlers for pipelined operations.
///
/// Every method has a no-op default, so implementors override only what they
/// observe. Payload slices borrow the connection's input buffer and are only
/// valid for the duration of the call; copy anything that must outlive it.
pub trait Callbacks {
    fn get(&mut self, _status: Status, _key: &[u8], _value: &[u8], _flags: u32, _cas: u64) {}

    fn store(&mut self, _status: Status, _op: StorageOp, _key: &[u8], _cas: u64) {}

    fn arithmetic(&mut self, _status: Status, _key: &[u8], _value: u64, _cas: u64) {}

    fn remove(&mut self, _status: Status, _key: &[u8]) {}

    fn tap_mutation(&mut self, _key: &[u8], _value: &[u8], _flags: u32, _expiry: u32, _cas: u64) {}

    fn tap_deletion(&mut self, _key: &[u8], _cas: u64) {}

    fn tap_flush(&mut self) {}

    fn tap_opaque(&mut self) {}
}

/// Drives the pipeline with no observers.
impl Callbacks for () {}

/// What the packet filter decided about one outbound frame.
pub enum FilterVerdict {
    Pass,
    /// Suppress the send. The frame's opaque stays registered in the command
    /// log so response correlation still lines up.
    Drop,
    /// Send these bytes instead.
    Replace(Vec<u8>),
}

/// Inspects every complete outbound data frame before it is queued.
/// Authentication traffic is never shown to the filter.
pub trait PacketFilter {
    fn filter(&mut self, frame: &[u8]) -> FilterVerdict;
}
