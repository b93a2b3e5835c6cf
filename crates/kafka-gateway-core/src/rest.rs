//! URL templating and HTTP client for the schema registry and connect runtime.

use std::fmt;
use std::time::Duration;

use reqwest::{Certificate, Client, Identity, StatusCode};
use tracing::debug;

use crate::config::{RestConfig, SslConfig};
use crate::error::{GatewayError, Result};
use crate::security::SecurityProtocol;

/// The REST-driven services next to a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestService {
    SchemaRegistry,
    KafkaConnect,
}

impl RestService {
    /// Cheapest read path, used for liveness.
    pub fn probe_path(self) -> &'static str {
        match self {
            RestService::SchemaRegistry => "subjects",
            RestService::KafkaConnect => "connectors",
        }
    }

    fn credentials(self, config: &RestConfig) -> Option<&str> {
        match self {
            RestService::SchemaRegistry => config.schema_registry_credentials.as_deref(),
            RestService::KafkaConnect => config.connect_credentials.as_deref(),
        }
    }
}

/// `<scheme>://[credentials@]<host>/<path>`.
///
/// Plaintext targets use http and never carry credentials. Every other
/// protocol uses https, with basic-auth credentials embedded when configured.
#[derive(Clone, PartialEq, Eq)]
pub struct RestEndpoint {
    scheme: &'static str,
    credentials: Option<String>,
    host: String,
    path: String,
}

impl RestEndpoint {
    pub fn new(protocol: SecurityProtocol, host: &str, path: &str, credentials: Option<&str>) -> Self {
        let plaintext = protocol == SecurityProtocol::Plaintext;
        Self {
            scheme: if plaintext { "http" } else { "https" },
            credentials: if plaintext {
                None
            } else {
                credentials.map(str::to_string)
            },
            host: host.trim().trim_end_matches('/').to_string(),
            path: path.trim_start_matches('/').to_string(),
        }
    }

    /// Endpoint for `service` on `host`, taking credentials from `config`.
    pub fn for_service(service: RestService, protocol: SecurityProtocol, host: &str, config: &RestConfig) -> Self {
        Self::new(protocol, host, service.probe_path(), service.credentials(config))
    }

    pub fn scheme(&self) -> &str {
        self.scheme
    }

    /// Full URL including credentials. Do not log.
    pub fn url(&self) -> String {
        match &self.credentials {
            Some(creds) => format!("{}://{}@{}/{}", self.scheme, creds, self.host, self.path),
            None => self.url_without_credentials(),
        }
    }

    pub fn url_without_credentials(&self) -> String {
        format!("{}://{}/{}", self.scheme, self.host, self.path)
    }

    /// `(user, password)` split at the first ':'.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        self.credentials.as_deref().and_then(|c| c.split_once(':'))
    }
}

impl fmt::Display for RestEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.credentials {
            Some(_) => write!(f, "{}://***@{}/{}", self.scheme, self.host, self.path),
            None => write!(f, "{}://{}/{}", self.scheme, self.host, self.path),
        }
    }
}

impl fmt::Debug for RestEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RestEndpoint({self})")
    }
}

/// HTTP client with the configured timeout and TLS trust.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    timeout: Duration,
}

impl RestClient {
    /// # Errors
    ///
    /// Returns `ConfigMissing` if the PEM truststore or keystore cannot be
    /// read or parsed.
    pub fn new(config: &RestConfig, ssl: &SslConfig) -> Result<Self> {
        let timeout = config.request_timeout();
        let mut builder = Client::builder().timeout(timeout).connect_timeout(timeout);

        if let Some(path) = &ssl.truststore_location {
            let pem = std::fs::read(path).map_err(|e| {
                GatewayError::config_missing(format!("cannot read truststore {}: {e}", path.display()))
            })?;
            let certs = Certificate::from_pem_bundle(&pem)
                .map_err(|e| GatewayError::config_missing(format!("invalid truststore: {e}")))?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }
        if let Some(path) = &ssl.keystore_location {
            let pem = std::fs::read(path).map_err(|e| {
                GatewayError::config_missing(format!("cannot read keystore {}: {e}", path.display()))
            })?;
            let identity = Identity::from_pem(&pem)
                .map_err(|e| GatewayError::config_missing(format!("invalid keystore: {e}")))?;
            builder = builder.identity(identity);
        }

        let client = builder
            .build()
            .map_err(|e| GatewayError::config_missing(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET the endpoint and return the status.
    ///
    /// # Errors
    ///
    /// `Timeout` when the request exceeds the configured bound,
    /// `Unreachable` for any other transport failure.
    pub async fn get(&self, endpoint: &RestEndpoint) -> Result<StatusCode> {
        let mut request = self.client.get(endpoint.url_without_credentials());
        if let Some((user, password)) = endpoint.basic_auth() {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::timeout(format!("{endpoint} did not answer in {}ms", self.timeout.as_millis()))
            } else {
                GatewayError::unreachable(format!("{endpoint}: {}", e.without_url()))
            }
        })?;
        let status = response.status();
        debug!(endpoint = %endpoint, status = status.as_u16(), "REST call completed");
        Ok(status)
    }
}
