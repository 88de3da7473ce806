//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (coordinator must be in the service table)
//! - Validate value ranges (timeouts > 0, ports numeric)
//! - Check that the chosen security mode has its secret material
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - An unknown security mode is not an error here; the gate rejects every
//!   call instead

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{GatewayConfig, RegistrySource};

/// A single semantic problem in a configuration file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("service `{0}` has an empty host or port")]
    EmptyAddress(String),

    #[error("service `{name}` has a non-numeric port `{port}`")]
    InvalidPort { name: String, port: String },

    #[error("coordinator service `{0}` is missing from [services]")]
    MissingCoordinator(String),

    #[error("pool.eviction_interval_secs must be between 60 and 600, got {0}")]
    EvictionInterval(u64),

    #[error("retries.multiplier must be at least 1.0")]
    Multiplier,

    #[error("security mode `{mode}` requires {field}")]
    MissingSecret { mode: String, field: &'static str },

    #[error("mutual TLS to backends (security.mutual_tls or mode \"mtls\") requires ca_path, cert_path and key_path")]
    IncompleteMutualTls,

    #[error("session.service must be set when sessions are enabled")]
    MissingSessionService,
}

/// Validate a parsed configuration, collecting every problem.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let positives = [
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.call_secs", config.timeouts.call_secs),
        ("timeouts.stream_secs", config.timeouts.stream_secs),
        ("timeouts.coordinator_secs", config.timeouts.coordinator_secs),
        ("registry.ttl_secs", config.registry.ttl_secs),
        ("registry.refresh_interval_secs", config.registry.refresh_interval_secs),
        ("registry.sweep_interval_secs", config.registry.sweep_interval_secs),
        ("pool.ttl_secs", config.pool.ttl_secs),
        ("retries.max_attempts", u64::from(config.retries.max_attempts)),
        ("upload.chunk_size", config.upload.chunk_size as u64),
    ];
    for (field, value) in positives {
        if value == 0 {
            errors.push(ValidationError::NotPositive(field));
        }
    }

    let mut names: Vec<&String> = config.services.keys().collect();
    names.sort();
    for name in names {
        let service = &config.services[name];
        if service.host.is_empty() || service.port.is_empty() {
            errors.push(ValidationError::EmptyAddress(name.clone()));
        } else if service.port.parse::<u16>().is_err() {
            errors.push(ValidationError::InvalidPort {
                name: name.clone(),
                port: service.port.clone(),
            });
        }
    }

    if config.registry.mode == RegistrySource::Coordinator
        && !config
            .services
            .contains_key(&config.registry.coordinator_service)
    {
        errors.push(ValidationError::MissingCoordinator(
            config.registry.coordinator_service.clone(),
        ));
    }

    if !(60..=600).contains(&config.pool.eviction_interval_secs) {
        errors.push(ValidationError::EvictionInterval(
            config.pool.eviction_interval_secs,
        ));
    }

    if config.retries.multiplier < 1.0 {
        errors.push(ValidationError::Multiplier);
    }

    match config.security.mode.as_deref() {
        Some(mode @ "sign") if config.security.sign.as_deref().unwrap_or("").is_empty() => {
            errors.push(ValidationError::MissingSecret {
                mode: mode.to_string(),
                field: "security.sign",
            });
        }
        Some(mode @ "hmac") => {
            if config.security.hmac_secret.as_deref().unwrap_or("").is_empty() {
                errors.push(ValidationError::MissingSecret {
                    mode: mode.to_string(),
                    field: "security.hmac_secret",
                });
            }
            if config.security.max_age_secs == 0 {
                errors.push(ValidationError::NotPositive("security.max_age_secs"));
            }
        }
        _ => {}
    }

    if config.security.dials_mutual_tls()
        && (config.security.ca_path.is_none()
            || config.security.cert_path.is_none()
            || config.security.key_path.is_none())
    {
        errors.push(ValidationError::IncompleteMutualTls);
    }

    if config.rate_limit.enabled && config.rate_limit.idle_sweep_secs == 0 {
        errors.push(ValidationError::NotPositive("rate_limit.idle_sweep_secs"));
    }

    if config.session.enabled && config.session.service.is_empty() {
        errors.push(ValidationError::MissingSessionService);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServiceConfig;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_problem_at_once() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".to_string();
        config.registry.mode = RegistrySource::Coordinator;
        config.security.mode = Some("hmac".to_string());
        config.services.insert(
            "reports".to_string(),
            ServiceConfig {
                host: String::new(),
                port: "7001".to_string(),
                ..Default::default()
            },
        );

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::BindAddress("not-an-address".into())));
        assert!(errors.contains(&ValidationError::EmptyAddress("reports".into())));
        assert!(errors.contains(&ValidationError::MissingCoordinator("masterservice".into())));
        assert!(errors.contains(&ValidationError::MissingSecret {
            mode: "hmac".into(),
            field: "security.hmac_secret",
        }));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn unknown_security_mode_is_left_to_the_gate() {
        let mut config = GatewayConfig::default();
        config.security.mode = Some("kerberos".to_string());
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn mtls_mode_needs_backend_certificates() {
        let mut config = GatewayConfig::default();
        config.security.mode = Some("mtls".to_string());
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::IncompleteMutualTls])
        );

        config.security.ca_path = Some("ca.pem".into());
        config.security.cert_path = Some("gateway.pem".into());
        config.security.key_path = Some("gateway.key".into());
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn rejects_non_numeric_port() {
        let mut config = GatewayConfig::default();
        config.services.insert(
            "billing".to_string(),
            ServiceConfig {
                host: "billing".to_string(),
                port: "http".to_string(),
                ..Default::default()
            },
        );
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::InvalidPort {
                name: "billing".into(),
                port: "http".into(),
            }]
        );
    }
}
