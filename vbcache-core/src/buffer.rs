// SPDX-License-Identifier: MIT
// Copyright (c) 2026 vbcache contributors – https://github.com/vbcache/vbcache

use crate::error::Error;

const MIN_GROW: usize = 128;

/// Append-mostly byte FIFO backing a connection's input, output, pending and
/// command-log streams.
///
/// Growth is geometric (at least half the current capacity, never less than
/// 128 bytes) and goes through `try_reserve` so a failed allocation comes
/// back as `Error::OutOfMemory` instead of aborting. Capacity is never given
/// back; these buffers live as long as the connection and churn constantly.
#[derive(Debug, Default)]
pub struct GrowBuf {
    data: Vec<u8>,
}

impl GrowBuf {
    pub fn new() -> GrowBuf {
        GrowBuf { data: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Makes room for at least `extra` more bytes.
    pub fn ensure(&mut self, extra: usize) -> Result<(), Error> {
        let spare = self.data.capacity() - self.data.len();
        if spare >= extra {
            return Ok(());
        }
        let want = extra.max(self.data.capacity() / 2).max(MIN_GROW);
        self.data.try_reserve(want).map_err(|_| Error::OutOfMemory)
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.ensure(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Drops the first `n` bytes and shifts the remainder down.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.data.len());
        self.data.drain(..n);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Extends the buffer by `n` zeroed bytes and hands back the new tail,
    /// for a socket read to fill. Pair with `truncate` to drop whatever the
    /// read did not cover.
    pub fn read_slot(&mut self, n: usize) -> Result<&mut [u8], Error> {
        self.ensure(n)?;
        let old = self.data.len();
        self.data.resize(old + n, 0);
        Ok(&mut self.data[old..])
    }

    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }
}
