// SPDX-License-Identifier: MIT
// Copyright (c) 2026 vbcache contributors – https://github.com/vbcache/vbcache

use std::fmt;

/// Endpoint identities captured once the TCP connection stands, in the
/// `"<ip>;<port>"` form SASL channel binding expects, both sides numeric.
#[derive(Debug, Clone)]
pub struct Binding {
    /// Configured hostname of the server.
    pub host: String,
    pub local: String,
    pub remote: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslError {
    /// The server advertised no mechanism this client can perform.
    NoKnownMechanism,
    /// The exchange cannot continue from its current state.
    Failed,
}

impl fmt::Display for SaslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaslError::NoKnownMechanism => write!(f, "no mutually supported SASL mechanism"),
            SaslError::Failed => write!(f, "SASL exchange failed"),
        }
    }
}

impl std::error::Error for SaslError {}

/// One in-flight SASL exchange, owned by a single connection between TCP
/// establishment and readiness.
pub trait SaslClient {
    /// Given the server-advertised mechanism list (space separated), picks
    /// one and produces the initial response to send with it.
    fn start(&mut self, mechs: &str) -> Result<(String, Vec<u8>), SaslError>;

    /// Answers a continuation challenge.
    fn step(&mut self, challenge: &[u8]) -> Result<Vec<u8>, SaslError>;

    fn finished(&self) -> bool;
}

/// Creates a fresh `SaslClient` per connection attempt.
pub trait Authenticator {
    fn begin(&self, binding: &Binding) -> Box<dyn SaslClient>;
}
