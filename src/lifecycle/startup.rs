//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every subsystem from one validated configuration
//! - Start background tasks (registry refresh/sweep, pool eviction, reload)
//!
//! # Design Decisions
//! - Construction order follows dependencies: pool, gate, registry, transport
//! - Nothing here is global; tests build as many gateways as they like
//! - Construction does no I/O; backends are dialed on first use

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::{GatewayConfig, RegistrySource};
use crate::pool::{spawn_evictor, ConnectionPool, GrpcDialer, TlsSettings};
use crate::registry::{
    spawn_refresher, spawn_sweeper, Registry, RegistryMode, RegistrySettings, RpcCoordinator, ServiceTable,
};
use crate::resilience::RetryPolicy;
use crate::security::SecurityGate;
use crate::transport::rpc::CallTimeouts;
use crate::transport::{Dispatcher, RpcTransport};

/// The wired-up core of the gateway, shared by the HTTP layer.
#[derive(Clone)]
pub struct Gateway {
    pub pool: Arc<ConnectionPool<GrpcDialer>>,
    pub registry: Arc<Registry>,
    pub gate: Arc<SecurityGate>,
    pub dispatcher: Dispatcher,
    eviction_interval: Duration,
}

impl Gateway {
    pub fn build(config: &GatewayConfig) -> Self {
        let tls = TlsSettings::from_config(&config.security);
        let dialer = GrpcDialer::from_config(&config.pool, config.timeouts.connect());
        let pool = Arc::new(ConnectionPool::new(dialer, Duration::from_secs(config.pool.ttl_secs)));
        let gate = Arc::new(SecurityGate::from_config(&config.security));

        let mode = match config.registry.mode {
            RegistrySource::Static => RegistryMode::Static,
            RegistrySource::Coordinator => RegistryMode::Coordinator {
                service: config.registry.coordinator_service.clone(),
                lookup: Arc::new(
                    RpcCoordinator::new(&config.registry.coordinator_service, pool.clone(), tls.clone())
                        .with_gate(gate.clone()),
                ),
            },
        };
        let registry = Arc::new(Registry::new(
            mode,
            ServiceTable::from_config(&config.services),
            RegistrySettings::from_config(config),
        ));

        let transport = RpcTransport::new(
            registry.clone(),
            pool.clone(),
            tls.clone(),
            RetryPolicy::from_config(&config.retries),
        )
        .with_timeouts(CallTimeouts {
            unary: config.timeouts.call(),
            stream: config.timeouts.stream(),
        })
        .with_chunk_size(config.upload.chunk_size);

        tracing::info!(
            registry = ?registry.mode(),
            services = config.services.len(),
            security = ?gate.mode(),
            backend_tls = tls.uses_tls(),
            backend_mtls = tls.mutual,
            "gateway core initialized"
        );

        Self {
            pool,
            registry,
            gate,
            dispatcher: Dispatcher::new(Arc::new(transport)),
            eviction_interval: Duration::from_secs(config.pool.eviction_interval_secs),
        }
    }

    /// Start refresher, sweeper and evictor. Each stops on `shutdown`.
    pub fn spawn_background(&self, shutdown: &broadcast::Receiver<()>) -> Vec<JoinHandle<()>> {
        vec![
            spawn_refresher(self.registry.clone(), shutdown.resubscribe()),
            spawn_sweeper(self.registry.clone(), shutdown.resubscribe()),
            spawn_evictor(self.pool.clone(), self.eviction_interval, shutdown.resubscribe()),
        ]
    }

    /// Apply reloaded configurations to the static service table.
    pub fn spawn_reloader(
        &self,
        mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let registry = self.registry.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = updates.recv() => {
                        let Some(config) = update else { break };
                        registry.reload_table(ServiceTable::from_config(&config.services));
                        tracing::info!(services = config.services.len(), "service table reloaded");
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }
}
