// SPDX-License-Identifier: MIT
// Copyright (c) 2026 vbcache contributors – https://github.com/vbcache/vbcache

/// Where one key lives: the vbucket it hashes into and the index of the
/// server currently mastering that vbucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySlot {
    pub vbucket: u16,
    pub server: usize,
}

/// The cluster topology collaborator.
///
/// The client never hashes keys itself; it asks the config. How the config is
/// obtained (bootstrap fetch, JSON parse, ...) is entirely the caller's
/// concern.
pub trait VbucketConfig {
    fn server_count(&self) -> usize;

    /// `"host:port"` for the given server index.
    fn server_name(&self, index: usize) -> &str;

    /// Maps a key to its vbucket and master server, or `None` when the
    /// config has no live server for it.
    fn locate(&self, key: &[u8]) -> Option<KeySlot>;

    /// Bucket credentials. A `None` user means the cluster takes
    /// unauthenticated connections.
    fn user(&self) -> Option<&str> {
        None
    }

    fn password(&self) -> Option<&str> {
        None
    }
}

/// Fixed in-memory topology: a server list and an explicit vbucket → server
/// table, keys hashed with CRC32.
#[derive(Debug, Clone)]
pub struct StaticConfig {
    servers: Vec<String>,
    vbucket_map: Vec<usize>,
    user: Option<String>,
    password: Option<String>,
}

impl StaticConfig {
    /// Builds a config with `n_vbuckets` vbuckets (must be a power of two)
    /// assigned round-robin over `servers`.
    pub fn new(servers: Vec<String>, n_vbuckets: usize) -> StaticConfig {
        assert!(n_vbuckets.is_power_of_two(), "vbucket count must be a power of two");
        assert!(!servers.is_empty(), "at least one server required");
        let vbucket_map = (0..n_vbuckets).map(|vb| vb % servers.len()).collect();
        StaticConfig {
            servers,
            vbucket_map,
            user: None,
            password: None,
        }
    }

    /// Builds a config from an explicit vbucket → server table.
    pub fn with_map(servers: Vec<String>, vbucket_map: Vec<usize>) -> StaticConfig {
        assert!(vbucket_map.len().is_power_of_two(), "vbucket count must be a power of two");
        assert!(vbucket_map.iter().all(|&s| s < servers.len()));
        StaticConfig {
            servers,
            vbucket_map,
            user: None,
            password: None,
        }
    }

    pub fn with_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> StaticConfig {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }
}

impl VbucketConfig for StaticConfig {
    fn server_count(&self) -> usize {
        self.servers.len()
    }

    fn server_name(&self, index: usize) -> &str {
        &self.servers[index]
    }

    fn locate(&self, key: &[u8]) -> Option<KeySlot> {
        let hash = crc32fast::hash(key);
        let vbucket = hash as usize & (self.vbucket_map.len() - 1);
        Some(KeySlot {
            vbucket: vbucket as u16,
            server: self.vbucket_map[vbucket],
        })
    }

    fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}
