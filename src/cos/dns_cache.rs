// COS Transfer Library for S3-compatible Object Storage
// Copyright 2025 cos-transfer contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Host resolution cache
//!
//! Memoizes DNS lookups in an [`LruCache`] for a configurable time-to-live
//! and spreads requests across every address a host resolved to. A failed
//! lookup yields `None`, in which case callers connect by hostname.

use crate::cos::config::CosConfig;
use crate::cos::lru_cache::LruCache;
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Name resolution backend consulted on cache misses.
#[async_trait]
pub trait Resolver: fmt::Debug + Send + Sync {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolves through the operating system via [`tokio::net::lookup_host`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in addrs {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }
        Ok(ips)
    }
}

#[derive(Clone, Debug)]
struct ResolvedHost {
    addresses: Vec<IpAddr>,
    resolved_at: Instant,
}

pub struct HostResolutionCache {
    entries: LruCache<String, ResolvedHost>,
    ttl: Duration,
    resolver: Arc<dyn Resolver>,
}

impl fmt::Debug for HostResolutionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostResolutionCache")
            .field("size", &self.entries.size())
            .field("capacity", &self.entries.capacity())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl HostResolutionCache {
    /// Creates a cache backed by the system resolver.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_resolver(capacity, ttl, Arc::new(SystemResolver))
    }

    pub fn with_resolver(capacity: usize, ttl: Duration, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            entries: LruCache::new(capacity),
            ttl,
            resolver,
        }
    }

    /// Builds the cache from `DnsCacheSize` and `DnsCacheExpireSeconds`.
    pub fn from_config(config: &CosConfig) -> Self {
        Self::new(config.dns_cache_size, config.dns_cache_ttl())
    }

    /// Returns one address of `host`, chosen uniformly at random among its
    /// resolved addresses, resolving again when the entry is missing or older
    /// than the TTL.
    pub async fn resolve(&self, host: &str) -> Option<IpAddr> {
        let key = host.to_ascii_lowercase();
        if let Ok(entry) = self.entries.get(&key)
            && entry.resolved_at.elapsed() < self.ttl
        {
            return pick(&entry.addresses);
        }

        match self.resolver.lookup(host).await {
            Ok(addresses) if !addresses.is_empty() => {
                log::debug!("resolved {host} to {addresses:?}");
                let address = pick(&addresses);
                self.entries.put(
                    key,
                    ResolvedHost {
                        addresses,
                        resolved_at: Instant::now(),
                    },
                );
                address
            }
            Ok(_) => {
                log::debug!("no address found for {host}");
                None
            }
            Err(e) => {
                log::debug!("unable to resolve {host}; {e}");
                None
            }
        }
    }

    /// Whether an entry for `host` is cached, stale or not.
    pub fn exist(&self, host: &str) -> bool {
        self.entries.exist(&host.to_ascii_lowercase())
    }

    pub fn size(&self) -> usize {
        self.entries.size()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

fn pick(addresses: &[IpAddr]) -> Option<IpAddr> {
    addresses.choose(&mut rand::rng()).copied()
}
