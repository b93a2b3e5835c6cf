//! Configuration types for the cluster gateway.
//!
//! Configuration is loaded from YAML files, `${VAR}` references are expanded
//! from the environment, and the result is validated before use. Every
//! credential field is optional; an empty string counts as absent.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Admin client tuning and bounded waits.
    #[serde(default)]
    pub admin: AdminConfig,

    /// TLS material shared by every cluster.
    #[serde(default)]
    pub ssl: SslConfig,

    /// Global SASL mechanism names.
    #[serde(default)]
    pub sasl: SaslConfig,

    /// Per-cluster credentials, keyed by cluster identity (case-insensitive).
    #[serde(default)]
    pub clusters: HashMap<String, ClusterConfig>,

    /// Schema registry and connect runtime access.
    #[serde(default)]
    pub rest: RestConfig,

    /// Connection cache limits.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Admin client tuning passed through to every connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    /// Per-request timeout on the wire.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Rounds over the bootstrap list before giving up.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Pause between bootstrap rounds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// TCP connect timeout for a single broker.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Bound on topic and ACL mutations.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Bound on a liveness probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

/// TLS material in PEM form.
///
/// A PEM keystore holds the client certificate chain followed by its
/// private key. Store types other than PEM are rejected when a TLS
/// connection is attempted.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SslConfig {
    #[serde(default, deserialize_with = "non_empty_path")]
    pub keystore_location: Option<PathBuf>,

    #[serde(default, deserialize_with = "non_empty")]
    pub keystore_password: Option<String>,

    #[serde(default, deserialize_with = "non_empty")]
    pub keystore_type: Option<String>,

    #[serde(default, deserialize_with = "non_empty")]
    pub key_password: Option<String>,

    #[serde(default, deserialize_with = "non_empty_path")]
    pub truststore_location: Option<PathBuf>,

    #[serde(default, deserialize_with = "non_empty")]
    pub truststore_password: Option<String>,

    #[serde(default, deserialize_with = "non_empty")]
    pub truststore_type: Option<String>,
}

impl std::fmt::Debug for SslConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("SslConfig")
            .field("keystore_location", &self.keystore_location)
            .field("keystore_password", &redact(&self.keystore_password))
            .field("keystore_type", &self.keystore_type)
            .field("key_password", &redact(&self.key_password))
            .field("truststore_location", &self.truststore_location)
            .field("truststore_password", &redact(&self.truststore_password))
            .field("truststore_type", &self.truststore_type)
            .finish()
    }
}

/// SASL mechanism names, one per SASL-bearing protocol family.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SaslConfig {
    /// Mechanism for `SASL_PLAIN` and `SASL_SSL-PLAINMECHANISM`.
    #[serde(default, deserialize_with = "non_empty")]
    pub plain_mechanism: Option<String>,

    /// Mechanism for `SASL_SSL-SCRAMMECHANISM`, e.g. "SCRAM-SHA-512".
    #[serde(default, deserialize_with = "non_empty")]
    pub scram_mechanism: Option<String>,

    /// Mechanism for `SASL_SSL-GSSAPIMECHANISM`.
    #[serde(default, deserialize_with = "non_empty")]
    pub gssapi_mechanism: Option<String>,
}

/// Credentials for one cluster.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClusterConfig {
    #[serde(default, deserialize_with = "non_empty")]
    pub plain_jaas_config: Option<String>,

    #[serde(default, deserialize_with = "non_empty")]
    pub scram_jaas_config: Option<String>,

    #[serde(default, deserialize_with = "non_empty")]
    pub gssapi_jaas_config: Option<String>,

    #[serde(default, deserialize_with = "non_empty")]
    pub gssapi_service_name: Option<String>,

    /// Replaces the shared TLS material for this cluster.
    #[serde(default)]
    pub ssl: Option<SslConfig>,
}

/// Schema registry and connect runtime settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestConfig {
    #[serde(default = "default_rest_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Basic-auth `user:password` embedded in TLS registry URLs.
    #[serde(default, deserialize_with = "non_empty")]
    pub schema_registry_credentials: Option<String>,

    /// Basic-auth `user:password` embedded in TLS connect URLs.
    #[serde(default, deserialize_with = "non_empty")]
    pub connect_credentials: Option<String>,
}

/// Connection cache limits.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Upper bound on cached connections. Unbounded when unset.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output logs in JSON format (for production).
    #[serde(default)]
    pub json: bool,
}

/// Expand environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable `VAR_NAME`.
/// If the variable is not set, replaces with an empty string.
pub fn expand_env_vars(s: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex");
    re.replace_all(s, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .to_string()
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn non_empty_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(non_empty(deserializer)?.map(PathBuf::from))
}

// Default value functions

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_retries() -> u32 {
    25
}

fn default_retry_backoff_ms() -> u64 {
    15_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_operation_timeout_ms() -> u64 {
    5_000
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_rest_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl AdminConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let timeouts = [
            ("admin.request_timeout_ms", self.request_timeout_ms),
            ("admin.connect_timeout_ms", self.connect_timeout_ms),
            ("admin.operation_timeout_ms", self.operation_timeout_ms),
            ("admin.probe_timeout_ms", self.probe_timeout_ms),
        ];
        for (field, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::ZeroTimeout { field });
            }
        }
        Ok(())
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_rest_timeout_ms(),
            schema_registry_credentials: None,
            connect_credentials: None,
        }
    }
}

impl RestConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "rest.request_timeout_ms",
            });
        }
        let creds = [
            (
                "rest.schema_registry_credentials",
                &self.schema_registry_credentials,
            ),
            ("rest.connect_credentials", &self.connect_credentials),
        ];
        for (field, value) in creds {
            if let Some(value) = value {
                if !value.contains(':') {
                    return Err(ConfigError::InvalidCredentials { field });
                }
            }
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if validation fails.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(&expand_env_vars(content))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> ConfigResult<()> {
        self.admin.validate()?;
        self.rest.validate()?;
        if self.cache.max_entries == Some(0) {
            return Err(ConfigError::InvalidCacheBound);
        }
        Ok(())
    }

    /// Look up a cluster by identity, ignoring case.
    pub fn cluster(&self, identity: &str) -> Option<&ClusterConfig> {
        let wanted = identity.to_lowercase();
        self.clusters
            .iter()
            .find(|(name, _)| name.to_lowercase() == wanted)
            .map(|(_, cluster)| cluster)
    }

    /// TLS material for a cluster: its own override, else the shared block.
    pub fn ssl_for(&self, identity: &str) -> &SslConfig {
        self.cluster(identity)
            .and_then(|c| c.ssl.as_ref())
            .unwrap_or(&self.ssl)
    }
}
