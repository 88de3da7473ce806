//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Service registry behaviour.
    pub registry: RegistryConfig,

    /// Static service table, keyed by logical service name.
    pub services: HashMap<String, ServiceConfig>,

    /// Backend connection pool settings.
    pub pool: PoolConfig,

    /// Retry policy applied to backend calls.
    pub retries: RetryConfig,

    /// Request signing and backend TLS material.
    pub security: SecurityConfig,

    /// Session chaining.
    pub session: SessionConfig,

    /// Streaming upload settings.
    pub upload: UploadConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent in-flight requests.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,

    /// CA bundle used to verify client certificates. Setting it turns on mTLS.
    #[serde(default)]
    pub client_ca_path: Option<String>,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for one HTTP request, in seconds.
    pub request_secs: u64,

    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Unary call timeout for services without their own setting.
    pub call_secs: u64,

    /// Upload stream timeout for services without their own setting.
    pub stream_secs: u64,

    /// Upper bound on one coordinator lookup.
    pub coordinator_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 180,
            connect_secs: 5,
            call_secs: 5,
            stream_secs: 120,
            coordinator_secs: 3,
        }
    }
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn call(&self) -> Duration {
        Duration::from_secs(self.call_secs)
    }

    pub fn stream(&self) -> Duration {
        Duration::from_secs(self.stream_secs)
    }

    pub fn coordinator(&self) -> Duration {
        Duration::from_secs(self.coordinator_secs)
    }
}

/// Where service addresses come from.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegistrySource {
    /// Addresses are read from `[services.<name>]`.
    #[default]
    Static,
    /// Addresses are asked from the coordinator service.
    Coordinator,
}

/// Service registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub mode: RegistrySource,

    /// Name of the service that answers location lookups.
    pub coordinator_service: String,

    /// Cached entries younger than this are served without I/O.
    pub ttl_secs: u64,

    /// How often expired entries are revalidated.
    pub refresh_interval_secs: u64,

    /// How often the purge sweep runs.
    pub sweep_interval_secs: u64,

    /// Entries without a successful refresh for this long are purged.
    pub purge_after_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mode: RegistrySource::Static,
            coordinator_service: "masterservice".to_string(),
            ttl_secs: 60,
            refresh_interval_secs: 30,
            sweep_interval_secs: 60,
            purge_after_secs: 600,
        }
    }
}

/// A statically configured backend service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ServiceConfig {
    pub host: String,

    /// Accepts either `port = 7000` or `port = "7000"`.
    #[serde(deserialize_with = "deserialize_port")]
    pub port: String,

    /// Unary call timeout override, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Upload stream timeout override, in seconds.
    #[serde(default)]
    pub stream_timeout_secs: Option<u64>,
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u64),
        Text(String),
    }

    Ok(match Port::deserialize(deserializer)? {
        Port::Number(n) => n.to_string(),
        Port::Text(s) => s,
    })
}

/// Backend connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Lifetime of a pooled channel before it is redialed.
    pub ttl_secs: u64,

    /// How often expired channels are evicted (60..=600).
    pub eviction_interval_secs: u64,

    /// HTTP/2 keepalive ping interval.
    pub keepalive_interval_secs: u64,

    /// How long to wait for a keepalive ack.
    pub keepalive_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            eviction_interval_secs: 300,
            keepalive_interval_secs: 30,
            keepalive_timeout_secs: 10,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, the first call included.
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds.
    pub max_backoff_ms: u64,

    /// Growth factor between attempts.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 200,
            max_backoff_ms: 2000,
            multiplier: 1.6,
        }
    }
}

/// Request signing and backend TLS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// One of `sign`, `hmac`, `mtls`. Anything else rejects every call.
    pub mode: Option<String>,

    /// Shared secret for `sign` mode. `GATEWAY_SIGN` overrides it.
    pub sign: Option<String>,

    /// HMAC key for `hmac` mode. `GATEWAY_HMAC_SECRET` overrides it.
    pub hmac_secret: Option<String>,

    /// Maximum accepted signature age, in seconds.
    pub max_age_secs: u64,

    /// CA used to verify backend certificates.
    pub ca_path: Option<PathBuf>,

    /// Client certificate presented to backends.
    pub cert_path: Option<PathBuf>,

    /// Client key presented to backends.
    pub key_path: Option<PathBuf>,

    /// Dial backends with mutual TLS.
    pub mutual_tls: bool,
}

impl SecurityConfig {
    /// Backends are dialed with client certificates when asked explicitly or
    /// when the gateway itself runs in `mtls` mode.
    pub fn dials_mutual_tls(&self) -> bool {
        self.mutual_tls || self.mode.as_deref() == Some("mtls")
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            mode: None,
            sign: None,
            hmac_secret: None,
            max_age_secs: 60,
            ca_path: None,
            cert_path: None,
            key_path: None,
            mutual_tls: false,
        }
    }
}

/// Session chaining configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Ask the session service about every bearer token.
    pub enabled: bool,

    /// Service that answers `checksession`.
    pub service: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service: "sessionservice".to_string(),
        }
    }
}

/// Streaming upload configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Size of every chunk except the last one of a file.
    pub chunk_size: usize,

    /// File name used when a raw body carries no `X-Filename`.
    pub default_filename: String,

    /// Largest accepted upload body, in bytes.
    pub max_body_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            default_filename: "upload.bin".to_string(),
            max_body_bytes: 512 * 1024 * 1024,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per second per IP.
    pub requests_per_second: u32,

    /// Burst capacity.
    pub burst_size: u32,

    /// How often buckets of quiet clients are dropped, in seconds.
    pub idle_sweep_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 100,
            burst_size: 50,
            idle_sweep_secs: 60,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
