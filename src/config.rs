use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for field '{field}': {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required field: {field}")]
    MissingRequired { field: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Where the proxy gets the bearer token for upstream calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// No `Authorization` header is sent.
    None,
    /// A fixed identity token.
    Static(String),
    /// Identity tokens minted by the compute metadata server.
    Metadata { metadata_url: String },
}

pub const DEFAULT_METADATA_URL: &str = "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/identity";

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    /// Base URL of the upstream agent service, without a trailing slash.
    pub upstream_url: String,
    pub app_name: String,
    pub auth: AuthMode,
    pub timeout: u64,
    pub log_level: log::LevelFilter,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            upstream_url: "http://127.0.0.1:8000".to_string(),
            app_name: "workmatch".to_string(),
            auth: AuthMode::None,
            timeout: 600,
            log_level: log::LevelFilter::Info,
        }
    }
}

impl ProxyConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        validate_url("upstream_url", &self.upstream_url)?;

        if self.app_name.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "app_name".to_string(),
            });
        }
        if self.app_name.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: "app_name".to_string(),
                value: self.app_name.clone(),
                reason: "Must be a single path segment".to_string(),
            });
        }

        if self.timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeout".to_string(),
                value: self.timeout.to_string(),
                reason: "Must be > 0".to_string(),
            });
        }

        match &self.auth {
            AuthMode::Static(token) if token.trim().is_empty() => {
                return Err(ConfigError::MissingRequired {
                    field: "auth.token".to_string(),
                });
            }
            AuthMode::Metadata { metadata_url } => {
                validate_url("auth.metadata_url", metadata_url)?;
            }
            _ => {}
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the proxy, e.g. `http://127.0.0.1:3000`.
    pub proxy_url: String,
    pub max_attempts: u32,
    pub retry_step: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proxy_url: "http://127.0.0.1:3000".to_string(),
            max_attempts: 5,
            retry_step: Duration::from_millis(500),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        validate_url("proxy_url", &self.proxy_url)?;
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_attempts".to_string(),
                value: self.max_attempts.to_string(),
                reason: "Must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn validate_url(field: &str, url: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::MissingRequired {
            field: field.to_string(),
        });
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: url.to_string(),
            reason: "URL must start with http:// or https://".to_string(),
        });
    }
    if url.ends_with('/') {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: url.to_string(),
            reason: "URL must not end with '/'".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ProxyConfig::default().validate().is_ok());
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn test_upstream_url_scheme_required() {
        let config = ProxyConfig {
            upstream_url: "workmatch.internal:8000".to_string(),
            ..Default::default()
        };
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "upstream_url"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_trailing_slash_rejected() {
        let config = ProxyConfig {
            upstream_url: "https://api.example.com/".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_static_token_rejected() {
        let config = ProxyConfig {
            auth: AuthMode::Static("  ".to_string()),
            ..Default::default()
        };
        match config.validate() {
            Err(ConfigError::MissingRequired { field }) => assert_eq!(field, "auth.token"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = ClientConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
