use std::str::FromStr;
use std::time::Duration;

use graphsign_core::{Context, Error, Result};

use crate::forward::RetryPolicy;

pub const PROXY_SERVER_HOST: &str = "PROXY_SERVER_HOST";
pub const PROXY_SERVER_PORT: &str = "PROXY_SERVER_PORT";
pub const PROXY_MAX_ATTEMPTS: &str = "PROXY_MAX_ATTEMPTS";
pub const PROXY_RETRY_DELAY_MS: &str = "PROXY_RETRY_DELAY_MS";
pub const LOG_LEVEL: &str = "LOG_LEVEL";
pub const PROXY_DEFAULT_SERVICE_TYPE: &str = "PROXY_DEFAULT_SERVICE_TYPE";

/// Runtime settings of the proxy.
///
/// Credentials are not part of it, they come from the credential chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address to listen on.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Attempts per upstream request, at least 1.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Credential scope service when the client sends no `service-type`.
    pub default_service_type: String,
}

impl Default for Config {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 80,
            max_attempts: retry.max_attempts,
            retry_delay: retry.retry_delay,
            log_level: "info".to_string(),
            default_service_type: "neptune-db".to_string(),
        }
    }
}

impl Config {
    /// Load the config from the environment of `ctx`, falling back to the
    /// defaults for unset or empty variables.
    pub fn from_env(ctx: &Context) -> Result<Self> {
        let mut config = Config::default();
        let var = |key: &str| ctx.env_var(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var(PROXY_SERVER_HOST) {
            config.host = v;
        }
        if let Some(v) = var(PROXY_SERVER_PORT) {
            config.port = parse(PROXY_SERVER_PORT, &v)?;
        }
        if let Some(v) = var(PROXY_MAX_ATTEMPTS) {
            config.max_attempts = parse(PROXY_MAX_ATTEMPTS, &v)?;
            if config.max_attempts == 0 {
                return Err(Error::config_invalid(format!(
                    "{PROXY_MAX_ATTEMPTS} must be at least 1"
                )));
            }
        }
        if let Some(v) = var(PROXY_RETRY_DELAY_MS) {
            config.retry_delay = Duration::from_millis(parse(PROXY_RETRY_DELAY_MS, &v)?);
        }
        if let Some(v) = var(LOG_LEVEL) {
            config.log_level = v;
        }
        if let Some(v) = var(PROXY_DEFAULT_SERVICE_TYPE) {
            config.default_service_type = v;
        }

        Ok(config)
    }

    /// `host:port` to bind.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Retry policy of the forwarder.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            retry_delay: self.retry_delay,
        }
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.trim().parse().map_err(|e| {
        Error::config_invalid(format!("{key} has invalid value {value:?}")).with_source(e)
    })
}
