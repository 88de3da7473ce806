//! Sources of service locations: the static table and the coordinator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::schema::ServiceConfig;
use crate::error::GatewayError;
use crate::registry::cache::ServiceInfo;

/// One row of the static service table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub host: String,
    pub port: String,
    pub timeout: Option<Duration>,
    pub stream_timeout: Option<Duration>,
}

impl From<&ServiceConfig> for ServiceEntry {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
            stream_timeout: config.stream_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Static name → address table. Swapped whole on config reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceTable {
    entries: HashMap<String, ServiceEntry>,
}

impl ServiceTable {
    pub fn from_config(services: &HashMap<String, ServiceConfig>) -> Self {
        Self {
            entries: services
                .iter()
                .map(|(name, config)| (name.clone(), ServiceEntry::from(config)))
                .collect(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: ServiceEntry) {
        self.entries.insert(name.into(), entry);
    }

    /// Exact name first, then with `-` normalized to `_`.
    pub fn get(&self, service: &str) -> Option<&ServiceEntry> {
        self.entries.get(service).or_else(|| {
            service
                .contains('-')
                .then(|| self.entries.get(&service.replace('-', "_")))
                .flatten()
        })
    }

    /// Address for `service`; empty host or port counts as absent.
    pub fn lookup(&self, service: &str) -> Result<ServiceInfo, GatewayError> {
        let entry = self
            .get(service)
            .ok_or_else(|| GatewayError::unavailable(service, "not in service table"))?;
        if entry.host.is_empty() || entry.port.is_empty() {
            return Err(GatewayError::unavailable(service, "empty host or port"));
        }
        Ok(ServiceInfo::new(&entry.host, &entry.port, false))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Asks the coordinator where a service lives.
#[async_trait]
pub trait CoordinatorLookup: Send + Sync {
    async fn lookup(&self, coordinator: &ServiceInfo, service: &str) -> Result<ServiceInfo, GatewayError>;
}

/// Resolution strategy, fixed at configuration load.
#[derive(Clone)]
pub enum RegistryMode {
    Static,
    Coordinator {
        /// Name of the coordinator in the static table.
        service: String,
        lookup: Arc<dyn CoordinatorLookup>,
    },
}

impl std::fmt::Debug for RegistryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryMode::Static => f.write_str("Static"),
            RegistryMode::Coordinator { service, .. } => f
                .debug_struct("Coordinator")
                .field("service", service)
                .finish_non_exhaustive(),
        }
    }
}
