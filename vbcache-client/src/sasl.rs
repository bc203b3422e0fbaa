// SPDX-License-Identifier: MIT
// Copyright (c) 2026 vbcache contributors – https://github.com/vbcache/vbcache

use tracing::debug;
use vbcache_core::{Authenticator, Binding, SaslClient, SaslError};

/// RFC 4616 PLAIN: one message, `authzid NUL authcid NUL password` with an
/// empty authzid. The whole exchange fits in the initial response.
pub struct Plain {
    username: String,
    password: String,
    done: bool,
}

impl SaslClient for Plain {
    fn start(&mut self, mechs: &str) -> Result<(String, Vec<u8>), SaslError> {
        if !mechs.split_whitespace().any(|m| m.eq_ignore_ascii_case("PLAIN")) {
            return Err(SaslError::NoKnownMechanism);
        }
        let mut initial = Vec::with_capacity(self.username.len() + self.password.len() + 2);
        initial.push(0);
        initial.extend_from_slice(self.username.as_bytes());
        initial.push(0);
        initial.extend_from_slice(self.password.as_bytes());
        self.done = true;
        Ok(("PLAIN".to_string(), initial))
    }

    fn step(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, SaslError> {
        // PLAIN has no continuation; a challenge means the server is confused
        Err(SaslError::Failed)
    }

    fn finished(&self) -> bool {
        self.done
    }
}

/// Hands out a fresh PLAIN exchange per connection attempt.
pub struct PlainAuth {
    username: String,
    password: String,
}

impl PlainAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> PlainAuth {
        PlainAuth {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Authenticator for PlainAuth {
    fn begin(&self, binding: &Binding) -> Box<dyn SaslClient> {
        debug!("[sasl] new exchange for {} ({} -> {})", binding.host, binding.local, binding.remote);
        Box::new(Plain {
            username: self.username.clone(),
            password: self.password.clone(),
            done: false,
        })
    }
}
