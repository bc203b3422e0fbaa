// SPDX-License-Identifier: MIT
// Copyright (c) 2026 vbcache contributors – https://github.com/vbcache/vbcache

use std::fmt;
use std::io;

/// Callback-visible outcome of a single pipelined operation.
///
/// `Success` through `DeltaBadval` mirror server status words; the rest are
/// produced locally when a connection dies, authentication fails, or a frame
/// cannot be understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    KeyEnoent,
    KeyEexists,
    E2big,
    Einval,
    NotStored,
    DeltaBadval,
    AuthError,
    AuthContinue,
    NetworkError,
    ProtocolError,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Synchronous submission and pipeline errors.
///
/// Everything that happens on the wire is reported through callbacks; this
/// enum covers only what can be detected at enqueue time plus the two
/// conditions that abort `execute()` itself (allocation failure, reactor
/// failure).
#[derive(Debug)]
pub enum Error {
    OutOfMemory,
    UnknownHost(String),
    NoServerForKey,
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "buffer allocation failed"),
            Error::UnknownHost(name) => write!(f, "cannot resolve server '{}'", name),
            Error::NoServerForKey => write!(f, "no server mapped for key"),
            Error::Io(e) => write!(f, "reactor failure: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
