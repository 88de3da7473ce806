//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the API and health handlers
//! - Wire up middleware (tracing, request ID, timeout, body limit, rate limit,
//!   default CORS and `Server` headers)
//! - Serve plain TCP or TLS (optionally requiring client certificates)
//! - Own background tasks and config reload for the server's lifetime
//! - Drain and close everything on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::middleware;
use axum::routing::{any, get};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::schema::{SessionConfig, UploadConfig};
use crate::config::{GatewayConfig, RegistrySource};
use crate::http::handlers::{api_handler, health, not_found};
use crate::http::request::X_REQUEST_ID;
use crate::lifecycle::Gateway;
use crate::net::tls::PeerIdentityAcceptor;
use crate::security::rate_limit::{rate_limit_middleware, spawn_bucket_sweeper, RateLimiterState};
use crate::security::SecurityGate;
use crate::transport::Dispatcher;

/// How long in-flight TLS connections get to finish after shutdown.
const TLS_DRAIN_GRACE: Duration = Duration::from_secs(10);

/// Headers set on every answer unless a handler already chose them.
pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "POST, GET, OPTIONS, PUT, DELETE, TRACE, PATCH, HEAD";
pub const ALLOW_HEADERS: &str = "Authorization, Content-Type, X-Request-ID, X-Sign, X-Filename";
pub const SERVER_NAME: &str = "api-gateway";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub gate: Arc<SecurityGate>,
    pub session: SessionConfig,
    pub upload: UploadConfig,
    /// Upper bound for all backend work of one request.
    pub request_timeout: Duration,
    /// Coordinator that heartbeats are relayed to; `None` answers locally.
    pub heartbeat_target: Option<String>,
}

/// HTTP front of the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    gateway: Gateway,
    limiter: Option<Arc<RateLimiterState>>,
}

impl HttpServer {
    pub fn new(config: GatewayConfig) -> Self {
        let gateway = Gateway::build(&config);
        Self::from_gateway(config, gateway)
    }

    /// Serve an already built core (tests inject their own).
    pub fn from_gateway(config: GatewayConfig, gateway: Gateway) -> Self {
        let state = AppState {
            dispatcher: gateway.dispatcher.clone(),
            gate: gateway.gate.clone(),
            session: config.session.clone(),
            upload: config.upload.clone(),
            request_timeout: config.timeouts.request(),
            heartbeat_target: (config.registry.mode == RegistrySource::Coordinator)
                .then(|| config.registry.coordinator_service.clone()),
        };
        let limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(RateLimiterState::new(&config.rate_limit)));
        let router = Self::build_router(&config, state, limiter.clone());
        Self {
            router,
            config,
            gateway,
            limiter,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState, limiter: Option<Arc<RateLimiterState>>) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);

        let mut router = Router::new()
            .route("/api/{version}/{module}", any(api_handler))
            .route("/api/{version}/{module}/{param}", any(api_handler))
            .route("/api/{version}/{module}/{param}/{param_id}", any(api_handler))
            .with_state(state)
            .route("/health", get(health))
            .fallback(not_found);

        if let Some(limiter) = limiter {
            router = router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
        }

        router
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(config.upload.max_body_bytes))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::GATEWAY_TIMEOUT,
                config.timeouts.request(),
            ))
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections.max(1)))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static(ALLOW_ORIGIN),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOW_METHODS),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(ALLOW_HEADERS),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::SERVER,
                HeaderValue::from_static(SERVER_NAME),
            ))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    fn start_background(
        &self,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: &broadcast::Receiver<()>,
    ) {
        self.gateway.spawn_background(shutdown);
        self.gateway.spawn_reloader(config_updates, shutdown.resubscribe());
        if let Some(limiter) = &self.limiter {
            spawn_bucket_sweeper(
                limiter.clone(),
                Duration::from_secs(self.config.rate_limit.idle_sweep_secs),
                shutdown.resubscribe(),
            );
        }
    }

    /// Serve plain HTTP until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, tls = false, "HTTP server starting");
        self.start_background(config_updates, &shutdown);

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("shutdown signal received, draining connections");
            })
            .await?;

        self.gateway.pool.close_all();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS until `shutdown` fires. With a client CA in the TLS
    /// config, every connection must present a valid client certificate.
    pub async fn run_tls(
        self,
        listener: std::net::TcpListener,
        tls: RustlsConfig,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, tls = true, "HTTP server starting");
        listener.set_nonblocking(true)?;
        self.start_background(config_updates, &shutdown);

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("shutdown signal received, draining connections");
            drain.graceful_shutdown(Some(TLS_DRAIN_GRACE));
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum_server::from_tcp(listener)
            .acceptor(PeerIdentityAcceptor::new(tls))
            .handle(handle)
            .serve(app)
            .await?;

        self.gateway.pool.close_all();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
