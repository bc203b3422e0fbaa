// SPDX-License-Identifier: MIT
// Copyright (c) 2026 vbcache contributors – https://github.com/vbcache/vbcache

//! Client for memcached-binary-protocol cache clusters with vbucket key
//! routing, per-server SASL, and batched pipelined operations.
//!
//! Operations (`mget`, `store`, `arithmetic`, `remove`, ...) only append to
//! the pipeline; run [`Cluster::execute`] to drive the sockets and observe
//! completions through the registered [`Callbacks`].

pub mod cluster;
pub mod logging;
pub mod reactor;
pub mod sasl;

mod server;

#[cfg(test)]
pub(crate) mod testutil;

pub use cluster::Cluster;
pub use reactor::MioReactor;
pub use sasl::{Plain, PlainAuth};

pub use vbcache_codec as codec;
pub use vbcache_core::{
    Authenticator, Binding, Callbacks, Error, FilterVerdict, GrowBuf, Interest, KeySlot,
    PacketFilter, Reactor, SaslClient, SaslError, StaticConfig, Status, StorageOp, VbucketConfig,
};
