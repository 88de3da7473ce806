//! Service registry: logical service name → network address.
//!
//! # Data Flow
//! ```text
//! resolve(service)
//!     → cache entry younger than TTL          → return, no I/O
//!     → RegistryMode::Static                  → static table lookup
//!     → RegistryMode::Coordinator             → coordinator lookup (bounded)
//!         → on failure, expired cache entry   → return stale, warn
//!     → store with fresh timestamp
//!
//! Refresher task: revalidate entries older than TTL, keep old value on failure
//! Sweeper task:   purge entries not refreshed for `purge_after`
//! ```
//!
//! # Design Decisions
//! - The coordinator's own address always comes from the static table
//! - A failed refresh never evicts; only the sweep does
//! - The static table is swapped atomically on config reload; cached
//!   entries pick up the change when they next expire

pub mod cache;
pub mod coordinator;
pub mod source;

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::schema::{GatewayConfig, RegistryConfig};
use crate::error::GatewayError;
use crate::observability::metrics;

pub use cache::{ServiceCache, ServiceInfo};
pub use coordinator::RpcCoordinator;
pub use source::{CoordinatorLookup, RegistryMode, ServiceEntry, ServiceTable};

/// Timing knobs of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    pub ttl: Duration,
    pub coordinator_timeout: Duration,
    pub refresh_interval: Duration,
    pub sweep_interval: Duration,
    pub purge_after: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

impl RegistrySettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let registry: &RegistryConfig = &config.registry;
        Self {
            ttl: Duration::from_secs(registry.ttl_secs),
            coordinator_timeout: config.timeouts.coordinator(),
            refresh_interval: Duration::from_secs(registry.refresh_interval_secs),
            sweep_interval: Duration::from_secs(registry.sweep_interval_secs),
            purge_after: Duration::from_secs(registry.purge_after_secs),
        }
    }
}

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub failed: usize,
}

pub struct Registry {
    mode: RegistryMode,
    table: ArcSwap<ServiceTable>,
    cache: ServiceCache,
    settings: RegistrySettings,
}

impl Registry {
    pub fn new(mode: RegistryMode, table: ServiceTable, settings: RegistrySettings) -> Self {
        Self {
            mode,
            table: ArcSwap::from_pointee(table),
            cache: ServiceCache::new(),
            settings,
        }
    }

    pub fn mode(&self) -> &RegistryMode {
        &self.mode
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn cache(&self) -> &ServiceCache {
        &self.cache
    }

    /// Current static table snapshot.
    pub fn table(&self) -> Arc<ServiceTable> {
        self.table.load_full()
    }

    /// Replace the static table, e.g. after a config reload.
    pub fn reload_table(&self, table: ServiceTable) {
        tracing::info!(services = table.len(), "service table reloaded");
        self.table.store(Arc::new(table));
    }

    /// Resolve `service` to an address.
    pub async fn resolve(&self, service: &str) -> Result<ServiceInfo, GatewayError> {
        if let Some(info) = self.cache.fresh(service, self.settings.ttl) {
            metrics::record_registry_lookup("hit");
            return Ok(info);
        }
        metrics::record_registry_lookup("miss");

        match self.lookup(service).await {
            Ok(info) => {
                self.cache.store(service, info.clone());
                tracing::debug!(service, addr = %info.addr(), "service resolved");
                Ok(info)
            }
            Err(e) => {
                if let (RegistryMode::Coordinator { .. }, Some(stale)) =
                    (&self.mode, self.cache.get(service))
                {
                    metrics::record_registry_lookup("stale");
                    tracing::warn!(
                        service,
                        addr = %stale.addr(),
                        age_secs = stale.age().as_secs(),
                        error = %e,
                        "coordinator lookup failed, serving stale address"
                    );
                    return Ok(stale);
                }
                metrics::record_registry_lookup("error");
                tracing::error!(service, error = %e, "service resolution failed");
                Err(e)
            }
        }
    }

    /// Ask the configured source, bypassing the cache.
    async fn lookup(&self, service: &str) -> Result<ServiceInfo, GatewayError> {
        match &self.mode {
            RegistryMode::Static => self.table.load().lookup(service),
            RegistryMode::Coordinator {
                service: coordinator_name,
                lookup,
            } => {
                let coordinator = self.table.load().lookup(coordinator_name)?;
                if service == coordinator_name {
                    return Ok(coordinator);
                }
                match time::timeout(
                    self.settings.coordinator_timeout,
                    lookup.lookup(&coordinator, service),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(GatewayError::unavailable(
                        service,
                        format!(
                            "coordinator lookup timed out after {:?}",
                            self.settings.coordinator_timeout
                        ),
                    )),
                }
            }
        }
    }

    /// Revalidate every entry older than the TTL. Failures keep the old value.
    pub async fn refresh_expired(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        for service in self.cache.expired(self.settings.ttl) {
            match self.lookup(&service).await {
                Ok(info) => {
                    self.cache.store(&service, info);
                    report.refreshed += 1;
                }
                Err(e) => {
                    tracing::debug!(service = %service, error = %e, "background refresh failed, keeping cached address");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Purge entries whose last successful refresh is older than `purge_after`.
    pub fn sweep(&self) -> usize {
        self.cache.purge_older_than(self.settings.purge_after)
    }
}

/// Run [`Registry::refresh_expired`] every refresh interval until shutdown.
pub fn spawn_refresher(registry: Arc<Registry>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = registry.settings.refresh_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = registry.refresh_expired().await;
                    if report.refreshed + report.failed > 0 {
                        tracing::debug!(refreshed = report.refreshed, failed = report.failed, "registry refresh pass");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("registry refresher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    })
}

/// Run [`Registry::sweep`] every sweep interval until shutdown.
pub fn spawn_sweeper(registry: Arc<Registry>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = registry.settings.sweep_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = registry.sweep();
                    if purged > 0 {
                        tracing::info!(purged, remaining = registry.cache.len(), "registry sweep pass");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("registry sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    })
}
