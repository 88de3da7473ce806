//! Resolved service locations with their age.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// Where a logical service currently lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub host: String,
    pub port: String,
    /// Coordinator flag: the service is only reachable from inside.
    pub internal: bool,
    pub last_update: Instant,
}

impl ServiceInfo {
    pub fn new(host: impl Into<String>, port: impl Into<String>, internal: bool) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            internal,
            last_update: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.last_update.elapsed()
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Concurrent name → location map. Values are replaced, never mutated.
#[derive(Debug, Default)]
pub struct ServiceCache {
    inner: DashMap<String, ServiceInfo>,
}

impl ServiceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `service` regardless of age.
    pub fn get(&self, service: &str) -> Option<ServiceInfo> {
        self.inner.get(service).map(|r| r.value().clone())
    }

    /// Entry for `service` only if younger than `ttl`.
    pub fn fresh(&self, service: &str, ttl: Duration) -> Option<ServiceInfo> {
        self.get(service).filter(|info| info.is_fresh(ttl))
    }

    /// Store with a fresh timestamp.
    pub fn store(&self, service: &str, mut info: ServiceInfo) {
        info.last_update = Instant::now();
        self.inner.insert(service.to_string(), info);
    }

    /// Names of entries at least `ttl` old.
    pub fn expired(&self, ttl: Duration) -> Vec<String> {
        self.inner
            .iter()
            .filter(|r| !r.value().is_fresh(ttl))
            .map(|r| r.key().clone())
            .collect()
    }

    /// Drop entries older than `max_age`. Returns how many were removed.
    pub fn purge_older_than(&self, max_age: Duration) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, info| info.age() <= max_age);
        before - self.inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
