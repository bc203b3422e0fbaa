// SPDX-License-Identifier: MIT
// Copyright (c) 2026 vbcache contributors – https://github.com/vbcache/vbcache

pub mod buffer;
pub mod callbacks;
pub mod config;
pub mod error;
pub mod reactor;
pub mod sasl;

pub use buffer::GrowBuf;
pub use callbacks::{Callbacks, FilterVerdict, PacketFilter, StorageOp};
pub use config::{KeySlot, StaticConfig, VbucketConfig};
pub use error::{Error, Status};
pub use reactor::{Event, Interest, Reactor};
pub use sasl::{Authenticator, Binding, SaslClient, SaslError};
