//! Provider configuration
//!
//! Settings come from the provider block (an attribute map) with environment
//! variables as fallback, the way the Terraform provider reads its `token`
//! argument or `ASTRA_API_TOKEN`.

use std::collections::HashMap;
use std::time::Duration;

use astra_core::resource::Value;
use thiserror::Error;

pub const DEFAULT_ASTRA_API_URL: &str = "https://api.astra.datastax.com";
pub const DEFAULT_STREAMING_API_URL: &str = "https://api.astra.datastax.com";

pub const ENV_TOKEN: &str = "ASTRA_API_TOKEN";
pub const ENV_ASTRA_API_URL: &str = "ASTRA_API_URL";
pub const ENV_STREAMING_API_URL: &str = "ASTRA_STREAMING_API_URL";
pub const ENV_PULSAR_ADMIN_URL: &str = "ASTRA_PULSAR_ADMIN_URL";
pub const ENV_ORG_ID: &str = "ASTRA_ORG_ID";

/// Longest accepted timeout or poll interval (one week)
pub const MAX_DURATION_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing API token: set `token` in the provider block or {ENV_TOKEN}")]
    MissingToken,

    #[error("invalid URL for {name}: {value}")]
    InvalidUrl { name: &'static str, value: String },

    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

/// Poll interval and overall budget for one kind of wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl WaitSettings {
    pub const fn new(interval_secs: u64, timeout_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// Per-operation waits; the defaults mirror the resource timeouts users know
/// from the Terraform provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waits {
    pub database_create: WaitSettings,
    pub database_update: WaitSettings,
    pub database_delete: WaitSettings,
    pub keyspace: WaitSettings,
    pub cdc_create: WaitSettings,
    pub pcu_association: WaitSettings,
    pub streaming_tenant: WaitSettings,
}

impl Default for Waits {
    fn default() -> Self {
        Self {
            database_create: WaitSettings::new(10, 40 * 60),
            database_update: WaitSettings::new(10, 40 * 60),
            database_delete: WaitSettings::new(10, 20 * 60),
            keyspace: WaitSettings::new(5, 10 * 60),
            cdc_create: WaitSettings::new(3, 10 * 60),
            pcu_association: WaitSettings::new(5, 10 * 60),
            streaming_tenant: WaitSettings::new(2, 5 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub token: String,
    pub astra_api_url: String,
    pub streaming_api_url: String,
    /// Pulsar admin REST endpoint; the streaming API proxies it by default
    pub pulsar_admin_url: String,
    /// Organization the token belongs to; looked up via `/v2/currentOrg` when unset
    pub org_id: Option<String>,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub waits: Waits,
}

impl ProviderConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            astra_api_url: DEFAULT_ASTRA_API_URL.to_string(),
            streaming_api_url: DEFAULT_STREAMING_API_URL.to_string(),
            pulsar_admin_url: DEFAULT_STREAMING_API_URL.to_string(),
            org_id: None,
            user_agent: format!("astra-provider/{}", env!("CARGO_PKG_VERSION")),
            request_timeout: Duration::from_secs(60),
            waits: Waits::default(),
        }
    }

    /// Build from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_attributes(&HashMap::new())
    }

    /// Build from a provider block, falling back to environment variables
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> Result<Self, ConfigError> {
        Self::from_sources(attributes, |key| std::env::var(key).ok())
    }

    fn from_sources(
        attributes: &HashMap<String, Value>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let lookup = |attr: &str, var: &str| -> Option<String> {
            get_string(attributes, attr)
                .map(str::to_string)
                .or_else(|| env(var))
                .filter(|s| !s.is_empty())
        };

        let token = lookup("token", ENV_TOKEN).ok_or(ConfigError::MissingToken)?;
        let mut config = Self::new(token);

        if let Some(url) = lookup("astra_api_url", ENV_ASTRA_API_URL) {
            config.astra_api_url = validate_url("astra_api_url", url)?;
        }
        if let Some(url) = lookup("streaming_api_url", ENV_STREAMING_API_URL) {
            config.streaming_api_url = validate_url("streaming_api_url", url)?;
        }
        config.pulsar_admin_url = match lookup("pulsar_admin_url", ENV_PULSAR_ADMIN_URL) {
            Some(url) => validate_url("pulsar_admin_url", url)?,
            None => config.streaming_api_url.clone(),
        };
        config.org_id = lookup("org_id", ENV_ORG_ID);

        if let Some(secs) = get_secs(attributes, "request_timeout")? {
            config.request_timeout = secs;
        }

        let waits = &mut config.waits;
        for (name, setting) in [
            ("database_create", &mut waits.database_create),
            ("database_update", &mut waits.database_update),
            ("database_delete", &mut waits.database_delete),
            ("keyspace", &mut waits.keyspace),
            ("cdc_create", &mut waits.cdc_create),
            ("pcu_association", &mut waits.pcu_association),
            ("streaming_tenant", &mut waits.streaming_tenant),
        ] {
            if let Some(timeout) = get_secs(attributes, &format!("{}_timeout", name))? {
                setting.timeout = timeout;
            }
            if let Some(interval) = get_secs(attributes, &format!("{}_poll_interval", name))? {
                setting.interval = interval;
            }
        }

        Ok(config)
    }
}

fn get_string<'a>(attributes: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    attributes.get(key).and_then(Value::as_str)
}

/// Durations are given as whole seconds
fn get_secs(
    attributes: &HashMap<String, Value>,
    key: &str,
) -> Result<Option<Duration>, ConfigError> {
    match attributes.get(key) {
        None => Ok(None),
        Some(Value::Int(n)) if (1..=MAX_DURATION_SECS).contains(n) => {
            Ok(Some(Duration::from_secs(*n as u64)))
        }
        Some(Value::Int(n)) if *n > 0 => Err(ConfigError::InvalidValue {
            name: key.to_string(),
            message: format!("{} seconds exceeds the limit of {}", n, MAX_DURATION_SECS),
        }),
        Some(other) => Err(ConfigError::InvalidValue {
            name: key.to_string(),
            message: format!("expected a positive number of seconds, got {:?}", other),
        }),
    }
}

fn validate_url(name: &'static str, url: String) -> Result<String, ConfigError> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(ConfigError::InvalidUrl { name, value: url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn token_from_attributes_wins_over_env() {
        let config = ProviderConfig::from_sources(&attrs(&[("token", Value::from("AstraCS:attr"))]), |_| {
            Some("AstraCS:env".to_string())
        })
        .unwrap();
        assert_eq!(config.token, "AstraCS:attr");
        assert_eq!(config.astra_api_url, DEFAULT_ASTRA_API_URL);
    }

    #[test]
    fn token_falls_back_to_env() {
        let config = ProviderConfig::from_sources(&HashMap::new(), |key| {
            (key == ENV_TOKEN).then(|| "AstraCS:env".to_string())
        })
        .unwrap();
        assert_eq!(config.token, "AstraCS:env");
    }

    #[test]
    fn missing_token_is_an_error() {
        let result = ProviderConfig::from_sources(&HashMap::new(), no_env);
        assert!(matches!(result, Err(ConfigError::MissingToken)));
    }

    #[test]
    fn urls_are_validated_and_trimmed() {
        let config = ProviderConfig::from_sources(
            &attrs(&[
                ("token", Value::from("t")),
                ("astra_api_url", Value::from("http://localhost:8080/")),
            ]),
            no_env,
        )
        .unwrap();
        assert_eq!(config.astra_api_url, "http://localhost:8080");
        assert_eq!(config.pulsar_admin_url, DEFAULT_STREAMING_API_URL);

        let result = ProviderConfig::from_sources(
            &attrs(&[
                ("token", Value::from("t")),
                ("streaming_api_url", Value::from("localhost")),
            ]),
            no_env,
        );
        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn wait_overrides() {
        let config = ProviderConfig::from_sources(
            &attrs(&[
                ("token", Value::from("t")),
                ("database_create_timeout", Value::Int(600)),
                ("cdc_create_poll_interval", Value::Int(1)),
            ]),
            no_env,
        )
        .unwrap();
        assert_eq!(config.waits.database_create.timeout, Duration::from_secs(600));
        assert_eq!(config.waits.database_create.interval, Duration::from_secs(10));
        assert_eq!(config.waits.cdc_create.interval, Duration::from_secs(1));

        let result = ProviderConfig::from_sources(
            &attrs(&[("token", Value::from("t")), ("keyspace_timeout", Value::Int(0))]),
            no_env,
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let result = ProviderConfig::from_sources(
            &attrs(&[
                ("token", Value::from("t")),
                ("database_create_timeout", Value::Int(i64::MAX)),
            ]),
            no_env,
        );
        match result {
            Err(ConfigError::InvalidValue { name, message }) => {
                assert_eq!(name, "database_create_timeout");
                assert!(message.contains("exceeds"), "{}", message);
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }

        let config = ProviderConfig::from_sources(
            &attrs(&[
                ("token", Value::from("t")),
                ("request_timeout", Value::Int(MAX_DURATION_SECS)),
            ]),
            no_env,
        )
        .unwrap();
        assert_eq!(
            config.request_timeout,
            Duration::from_secs(MAX_DURATION_SECS as u64)
        );
    }
}
