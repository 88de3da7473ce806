//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable that overrides `security.sign`.
pub const SIGN_ENV: &str = "GATEWAY_SIGN";

/// Environment variable that overrides `security.hmac_secret`.
pub const HMAC_SECRET_ENV: &str = "GATEWAY_HMAC_SECRET";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content, |key| std::env::var(key).ok())
}

/// Load the file if it exists, otherwise fall back to defaults.
///
/// The boolean is `true` when the file was missing.
pub fn load_or_default(path: &Path) -> Result<(GatewayConfig, bool), ConfigError> {
    if path.exists() {
        return load_config(path).map(|config| (config, false));
    }
    let mut config = GatewayConfig::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok((config, true))
}

/// Parse TOML text, apply secret overrides, and validate.
pub fn parse_config<F>(content: &str, env: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: GatewayConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config, env);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Secrets from the environment win over the file.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(sign) = env(SIGN_ENV).filter(|v| !v.is_empty()) {
        config.security.sign = Some(sign);
    }
    if let Some(secret) = env(HMAC_SECRET_ENV).filter(|v| !v.is_empty()) {
        config.security.hmac_secret = Some(secret);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn environment_secret_satisfies_hmac_mode() {
        let toml = r#"
            [security]
            mode = "hmac"
        "#;

        assert!(matches!(
            parse_config(toml, |_| None),
            Err(ConfigError::Validation(_))
        ));

        let config = parse_config(toml, |key| {
            (key == HMAC_SECRET_ENV).then(|| "from-env".to_string())
        })
        .unwrap();
        assert_eq!(config.security.hmac_secret.as_deref(), Some("from-env"));
    }

    #[test]
    fn shipped_config_is_valid() {
        let config = parse_config(include_str!("../../config/gateway.toml"), |_| None).unwrap();
        assert_eq!(config.services.len(), 3);
        assert_eq!(config.services["sessionservice"].port, "5301");
        assert_eq!(config.services["reports"].port, "5310");
    }

    #[test]
    fn parse_error_is_reported() {
        let err = parse_config("[registry\nttl_secs = 1", |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[services.reports]\nhost = \"127.0.0.1\"\nport = 7001\n"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.services["reports"].host, "127.0.0.1");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, missing) = load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert!(missing);
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }
}
