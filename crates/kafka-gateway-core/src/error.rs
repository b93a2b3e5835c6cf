//! Error types for the gateway.
//!
//! [`GatewayError`] is the taxonomy surfaced to callers. The lower layers
//! ([`AdminError`], [`ConfigError`], [`TlsError`]) carry richer detail and are
//! folded into it at the component boundary.

use std::fmt;

use thiserror::Error;

/// Upper bound on diagnostic text carried by a [`GatewayError`].
pub const MAX_DIAGNOSTIC_LEN: usize = 256;

/// Stable tag for each error kind, suitable for structured responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigMissing,
    Unreachable,
    Invalid,
    Conflict,
    NotFound,
    Timeout,
    PartialFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigMissing => "CONFIG_MISSING",
            ErrorKind::Unreachable => "UNREACHABLE",
            ErrorKind::Invalid => "INVALID",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::PartialFailure => "PARTIAL_FAILURE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the gateway's public operations.
///
/// Messages are truncated to [`MAX_DIAGNOSTIC_LEN`] characters when built
/// through the lowercase constructors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Required configuration is absent or unusable. Not retryable.
    #[error("configuration missing: {0}")]
    ConfigMissing(String),

    /// The cluster or service could not be reached.
    #[error("cluster unreachable: {0}")]
    Unreachable(String),

    /// The request was malformed.
    #[error("invalid request: {0}")]
    Invalid(String),

    /// The resource already exists.
    #[error("already exists: {0}")]
    Conflict(String),

    /// The target resource is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// A bounded wait was exceeded.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A batch mutation failed and may have been partially applied.
    #[error("partial failure: {0}")]
    PartialFailure(String),
}

impl GatewayError {
    pub fn config_missing(msg: impl AsRef<str>) -> Self {
        GatewayError::ConfigMissing(bounded(msg.as_ref()))
    }

    pub fn unreachable(msg: impl AsRef<str>) -> Self {
        GatewayError::Unreachable(bounded(msg.as_ref()))
    }

    pub fn invalid(msg: impl AsRef<str>) -> Self {
        GatewayError::Invalid(bounded(msg.as_ref()))
    }

    pub fn conflict(msg: impl AsRef<str>) -> Self {
        GatewayError::Conflict(bounded(msg.as_ref()))
    }

    pub fn not_found(msg: impl AsRef<str>) -> Self {
        GatewayError::NotFound(bounded(msg.as_ref()))
    }

    pub fn timeout(msg: impl AsRef<str>) -> Self {
        GatewayError::Timeout(bounded(msg.as_ref()))
    }

    pub fn partial_failure(msg: impl AsRef<str>) -> Self {
        GatewayError::PartialFailure(bounded(msg.as_ref()))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::ConfigMissing(_) => ErrorKind::ConfigMissing,
            GatewayError::Unreachable(_) => ErrorKind::Unreachable,
            GatewayError::Invalid(_) => ErrorKind::Invalid,
            GatewayError::Conflict(_) => ErrorKind::Conflict,
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::Timeout(_) => ErrorKind::Timeout,
            GatewayError::PartialFailure(_) => ErrorKind::PartialFailure,
        }
    }

    /// The diagnostic text without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            GatewayError::ConfigMissing(m)
            | GatewayError::Unreachable(m)
            | GatewayError::Invalid(m)
            | GatewayError::Conflict(m)
            | GatewayError::NotFound(m)
            | GatewayError::Timeout(m)
            | GatewayError::PartialFailure(m) => m,
        }
    }

    /// Whether the same call may succeed if retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Unreachable | ErrorKind::Timeout | ErrorKind::PartialFailure
        )
    }
}

impl From<AdminError> for GatewayError {
    fn from(err: AdminError) -> Self {
        match &err {
            AdminError::Broker { code, .. } => match *code {
                codes::TOPIC_ALREADY_EXISTS => GatewayError::conflict(err.to_string()),
                codes::UNKNOWN_TOPIC_OR_PARTITION => GatewayError::not_found(err.to_string()),
                codes::INVALID_TOPIC
                | codes::INVALID_PARTITIONS
                | codes::INVALID_REPLICATION_FACTOR
                | codes::INVALID_REPLICA_ASSIGNMENT
                | codes::INVALID_CONFIG
                | codes::INVALID_REQUEST => GatewayError::invalid(err.to_string()),
                codes::REQUEST_TIMED_OUT => GatewayError::timeout(err.to_string()),
                _ => GatewayError::unreachable(err.to_string()),
            },
            AdminError::Timeout { .. } => GatewayError::timeout(err.to_string()),
            AdminError::Config(_) | AdminError::Tls(_) => {
                GatewayError::config_missing(err.to_string())
            }
            _ => GatewayError::unreachable(err.to_string()),
        }
    }
}

impl From<ConfigError> for GatewayError {
    fn from(err: ConfigError) -> Self {
        GatewayError::config_missing(err.to_string())
    }
}

/// Truncate to [`MAX_DIAGNOSTIC_LEN`] characters on a char boundary.
fn bounded(msg: &str) -> String {
    match msg.char_indices().nth(MAX_DIAGNOSTIC_LEN) {
        Some((idx, _)) => format!("{}...", &msg[..idx]),
        None => msg.to_string(),
    }
}

/// Kafka error codes the gateway distinguishes.
pub mod codes {
    pub const NONE: i16 = 0;
    pub const UNKNOWN_TOPIC_OR_PARTITION: i16 = 3;
    pub const REQUEST_TIMED_OUT: i16 = 7;
    pub const INVALID_TOPIC: i16 = 17;
    pub const TOPIC_AUTHORIZATION_FAILED: i16 = 29;
    pub const CLUSTER_AUTHORIZATION_FAILED: i16 = 31;
    pub const UNSUPPORTED_SASL_MECHANISM: i16 = 33;
    pub const TOPIC_ALREADY_EXISTS: i16 = 36;
    pub const INVALID_PARTITIONS: i16 = 37;
    pub const INVALID_REPLICATION_FACTOR: i16 = 38;
    pub const INVALID_REPLICA_ASSIGNMENT: i16 = 39;
    pub const INVALID_CONFIG: i16 = 40;
    pub const NOT_CONTROLLER: i16 = 41;
    pub const INVALID_REQUEST: i16 = 42;
    pub const SECURITY_DISABLED: i16 = 54;
    pub const SASL_AUTHENTICATION_FAILED: i16 = 58;
}

/// Errors related to configuration parsing and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A timeout value of zero would make every call fail immediately.
    #[error("{field} must be greater than zero")]
    ZeroTimeout { field: &'static str },

    /// REST credentials must look like `user:password`.
    #[error("{field} must be of the form 'user:password'")]
    InvalidCredentials { field: &'static str },

    /// Cache bound of zero would evict every connection on insert.
    #[error("cache.max_entries must be at least 1")]
    InvalidCacheBound,
}

/// Errors raised while preparing TLS material.
#[derive(Error, Debug)]
pub enum TlsError {
    /// Failed to read a certificate file.
    #[error("failed to load certificate from '{path}': {message}")]
    CertificateLoad { path: String, message: String },

    /// Failed to read a private key file.
    #[error("failed to load private key from '{path}': {message}")]
    PrivateKeyLoad { path: String, message: String },

    /// The file parsed but held no certificates.
    #[error("no certificates found in '{0}'")]
    NoCertificates(String),

    /// The file parsed but held no private key.
    #[error("no private key found in '{0}'")]
    NoPrivateKey(String),

    /// Only PEM stores can be read by rustls.
    #[error("unsupported {store} type '{store_type}' (only PEM is supported)")]
    UnsupportedStoreType {
        store: &'static str,
        store_type: String,
    },

    /// rustls rejected the assembled configuration.
    #[error("TLS configuration error: {0}")]
    Config(String),

    /// The handshake with the broker failed.
    #[error("TLS handshake failed: {0}")]
    Handshake(String),
}

/// Errors raised by an administrative client talking to a cluster.
#[derive(Error, Debug)]
pub enum AdminError {
    /// TCP/IO connection error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// Broker is not available or connection failed.
    #[error("broker {address} unavailable: {message}")]
    BrokerUnavailable { address: String, message: String },

    /// None of the bootstrap hosts accepted a connection.
    #[error("no bootstrap host reachable after {attempts} attempt(s)")]
    NoBrokersAvailable { attempts: u32 },

    /// The broker answered with a non-zero error code.
    #[error("broker error {code}: {message}")]
    Broker { code: i16, message: String },

    /// Failed to decode Kafka protocol message.
    #[error("protocol decode error: {message}")]
    ProtocolDecode { message: String },

    /// Failed to encode Kafka protocol message.
    #[error("protocol encode error: {message}")]
    ProtocolEncode { message: String },

    /// Request correlation ID mismatch.
    #[error("correlation ID mismatch: expected {expected}, got {actual}")]
    CorrelationIdMismatch { expected: i32, actual: i32 },

    /// SASL exchange failed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The configured mechanism cannot be spoken by this client.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A single request exceeded its deadline.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// TLS material could not be prepared.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// The security profile is missing material the client needs.
    #[error("client configuration error: {0}")]
    Config(String),

    /// The handle was closed.
    #[error("client closed")]
    Closed,
}

impl AdminError {
    pub fn broker(code: i16, message: Option<&str>) -> Self {
        AdminError::Broker {
            code,
            message: message.unwrap_or("no error message").to_string(),
        }
    }

    pub fn broker_code(&self) -> Option<i16> {
        match self {
            AdminError::Broker { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Result type alias for admin client operations.
pub type AdminResult<T> = std::result::Result<T, AdminError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for TLS operations.
pub type TlsResult<T> = std::result::Result<T, TlsError>;
