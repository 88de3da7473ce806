//! Request authentication at the gateway/backend boundary.
//!
//! # Modes
//! - `sign`: the presented sign equals the shared secret
//! - `hmac`: the presented value is `"<hex sig>:<unix ts>"` where
//!   `sig = HMAC-SHA256(secret, "<module>:<ts>")` and the timestamp is at most
//!   `max_age` away from now
//! - `mtls`: the TLS listener verified a client certificate
//! - anything else: every call is rejected
//!
//! Comparisons of secret material are constant-time.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::schema::SecurityConfig;
use crate::error::GatewayError;
use crate::net::tls::PeerIdentity;
use crate::proto::Request;

type HmacSha256 = Hmac<Sha256>;

/// Authentication mode, fixed at configuration load.
#[derive(Clone, PartialEq, Eq)]
pub enum SecurityMode {
    StaticSign { sign: String },
    Hmac { secret: String, max_age: Duration },
    MutualTls,
    Unconfigured,
}

impl std::fmt::Debug for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityMode::StaticSign { .. } => f.write_str("StaticSign"),
            SecurityMode::Hmac { max_age, .. } => {
                f.debug_struct("Hmac").field("max_age", max_age).finish_non_exhaustive()
            }
            SecurityMode::MutualTls => f.write_str("MutualTls"),
            SecurityMode::Unconfigured => f.write_str("Unconfigured"),
        }
    }
}

impl SecurityMode {
    pub fn from_config(config: &SecurityConfig) -> Self {
        match config.mode.as_deref() {
            Some("sign") => SecurityMode::StaticSign {
                sign: config.sign.clone().unwrap_or_default(),
            },
            Some("hmac") => SecurityMode::Hmac {
                secret: config.hmac_secret.clone().unwrap_or_default(),
                max_age: Duration::from_secs(config.max_age_secs),
            },
            Some("mtls") => SecurityMode::MutualTls,
            _ => SecurityMode::Unconfigured,
        }
    }
}

/// Checks inbound requests and signs outbound ones.
#[derive(Debug, Clone)]
pub struct SecurityGate {
    mode: SecurityMode,
}

impl SecurityGate {
    pub fn new(mode: SecurityMode) -> Self {
        if mode == SecurityMode::Unconfigured {
            tracing::warn!("security mode not configured, every request will be rejected");
        }
        Self { mode }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(SecurityMode::from_config(config))
    }

    pub fn mode(&self) -> &SecurityMode {
        &self.mode
    }

    /// Authorize a request for `module` against the wall clock.
    pub fn authorize(
        &self,
        module: &str,
        presented: Option<&str>,
        peer: Option<&PeerIdentity>,
    ) -> Result<(), GatewayError> {
        self.authorize_at(module, presented, peer, unix_now())
    }

    /// Authorize with an explicit `now` (unix seconds).
    pub fn authorize_at(
        &self,
        module: &str,
        presented: Option<&str>,
        peer: Option<&PeerIdentity>,
        now: i64,
    ) -> Result<(), GatewayError> {
        let result = match &self.mode {
            SecurityMode::StaticSign { sign } => match presented {
                Some(value) if !sign.is_empty() && bool::from(value.as_bytes().ct_eq(sign.as_bytes())) => Ok(()),
                _ => Err(GatewayError::Unauthorized("invalid sign".into())),
            },
            SecurityMode::Hmac { secret, max_age } => match presented {
                Some(value) if verify_hmac(secret, module, value, *max_age, now) => Ok(()),
                Some(_) => Err(GatewayError::Unauthorized("invalid or expired signature".into())),
                None => Err(GatewayError::Unauthorized("missing signature".into())),
            },
            SecurityMode::MutualTls => match peer {
                Some(identity) if identity.certificates > 0 => Ok(()),
                _ => Err(GatewayError::Unauthorized("client certificate required".into())),
            },
            SecurityMode::Unconfigured => Err(GatewayError::SecurityNotConfigured),
        };

        if let Err(e) = &result {
            tracing::warn!(module, mode = ?self.mode, error = %e, "request rejected by security gate");
        }
        result
    }

    /// Sign an outbound request for the backend boundary.
    pub fn stamp(&self, request: &mut Request) {
        self.stamp_at(request, unix_now());
    }

    pub fn stamp_at(&self, request: &mut Request, now: i64) {
        request.sign = match &self.mode {
            SecurityMode::StaticSign { sign } => Some(sign.clone()),
            SecurityMode::Hmac { secret, .. } => {
                let module = request.module.as_deref().unwrap_or_default();
                match compute_hmac(secret, module, now) {
                    Ok(signature) => Some(format!("{signature}:{now}")),
                    Err(e) => {
                        tracing::error!(module, error = %e, "failed to sign outbound request");
                        None
                    }
                }
            }
            SecurityMode::MutualTls | SecurityMode::Unconfigured => None,
        };
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// `hex(HMAC-SHA256(secret, "<module>:<timestamp>"))`.
pub fn compute_hmac(secret: &str, module: &str, timestamp: i64) -> Result<String, GatewayError> {
    Ok(hex::encode(mac(secret, module, timestamp)?.finalize().into_bytes()))
}

fn mac(secret: &str, module: &str, timestamp: i64) -> Result<HmacSha256, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::Unauthorized(format!("failed to create HMAC: {e}")))?;
    mac.update(format!("{module}:{timestamp}").as_bytes());
    Ok(mac)
}

/// Check a presented `"<hex sig>:<ts>"` value.
pub fn verify_hmac(secret: &str, module: &str, presented: &str, max_age: Duration, now: i64) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Some((signature, timestamp)) = presented.rsplit_once(':') else {
        return false;
    };
    let Ok(timestamp) = timestamp.parse::<i64>() else {
        return false;
    };

    let max_age = max_age.as_secs() as i64;
    let age = now.saturating_sub(timestamp);
    if age > max_age || age < -max_age {
        return false;
    }

    let (Ok(signature), Ok(mac)) = (hex::decode(signature), mac(secret, module, timestamp)) else {
        return false;
    };
    mac.verify_slice(&signature).is_ok()
}
