use std::fmt;
use std::time::Duration;

use crate::config::{GatewayConfig, SslConfig};
use crate::error::{AdminError, Result};

use super::{JaasCredentials, SaslMechanism, SecurityProtocol};

/// Timeouts and retry policy handed to the admin client unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTuning {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub retries: u32,
    pub retry_backoff: Duration,
}

/// SASL material for one profile. Any field may be absent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SaslSettings {
    pub mechanism: Option<String>,
    pub jaas_config: Option<String>,
    pub kerberos_service_name: Option<String>,
}

impl SaslSettings {
    /// Resolve the mechanism, falling back to `default` when none is configured.
    ///
    /// An unrecognised configured name is a configuration error.
    pub fn mechanism_or(&self, default: SaslMechanism) -> std::result::Result<SaslMechanism, AdminError> {
        match &self.mechanism {
            Some(name) => name
                .parse()
                .map_err(|e| AdminError::Config(format!("configured mechanism rejected: {e}"))),
            None => Ok(default),
        }
    }

    pub fn credentials(&self) -> Option<JaasCredentials> {
        self.jaas_config.as_deref().and_then(JaasCredentials::parse)
    }
}

impl fmt::Debug for SaslSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslSettings")
            .field("mechanism", &self.mechanism)
            .field("jaas_config", &self.jaas_config.as_ref().map(|_| "<redacted>"))
            .field("kerberos_service_name", &self.kerberos_service_name)
            .finish()
    }
}

/// Everything needed to open an administrative connection under one protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityProfile {
    Plaintext {
        tuning: ClientTuning,
    },
    Ssl {
        tls: SslConfig,
        tuning: ClientTuning,
    },
    SaslPlain {
        sasl: SaslSettings,
        tuning: ClientTuning,
    },
    SaslSslPlain {
        tls: SslConfig,
        sasl: SaslSettings,
        tuning: ClientTuning,
    },
    SaslSslScram {
        tls: SslConfig,
        sasl: SaslSettings,
        tuning: ClientTuning,
    },
    SaslSslGssapi {
        tls: SslConfig,
        sasl: SaslSettings,
        tuning: ClientTuning,
    },
}

impl SecurityProfile {
    pub fn protocol(&self) -> SecurityProtocol {
        match self {
            Self::Plaintext { .. } => SecurityProtocol::Plaintext,
            Self::Ssl { .. } => SecurityProtocol::Ssl,
            Self::SaslPlain { .. } => SecurityProtocol::SaslPlain,
            Self::SaslSslPlain { .. } => SecurityProtocol::SaslSslPlain,
            Self::SaslSslScram { .. } => SecurityProtocol::SaslSslScram,
            Self::SaslSslGssapi { .. } => SecurityProtocol::SaslSslGssapi,
        }
    }

    pub fn client_id(&self) -> &'static str {
        self.protocol().client_id()
    }

    pub fn tuning(&self) -> &ClientTuning {
        match self {
            Self::Plaintext { tuning }
            | Self::Ssl { tuning, .. }
            | Self::SaslPlain { tuning, .. }
            | Self::SaslSslPlain { tuning, .. }
            | Self::SaslSslScram { tuning, .. }
            | Self::SaslSslGssapi { tuning, .. } => tuning,
        }
    }

    pub fn tls(&self) -> Option<&SslConfig> {
        match self {
            Self::Plaintext { .. } | Self::SaslPlain { .. } => None,
            Self::Ssl { tls, .. }
            | Self::SaslSslPlain { tls, .. }
            | Self::SaslSslScram { tls, .. }
            | Self::SaslSslGssapi { tls, .. } => Some(tls),
        }
    }

    pub fn sasl(&self) -> Option<&SaslSettings> {
        match self {
            Self::Plaintext { .. } | Self::Ssl { .. } => None,
            Self::SaslPlain { sasl, .. }
            | Self::SaslSslPlain { sasl, .. }
            | Self::SaslSslScram { sasl, .. }
            | Self::SaslSslGssapi { sasl, .. } => Some(sasl),
        }
    }

    /// Mechanism used when the configuration names none.
    pub fn default_mechanism(&self) -> Option<SaslMechanism> {
        match self {
            Self::Plaintext { .. } | Self::Ssl { .. } => None,
            Self::SaslPlain { .. } | Self::SaslSslPlain { .. } => Some(SaslMechanism::Plain),
            Self::SaslSslScram { .. } => Some(SaslMechanism::ScramSha256),
            Self::SaslSslGssapi { .. } => Some(SaslMechanism::Gssapi),
        }
    }
}

/// Derives [`SecurityProfile`]s from configuration.
///
/// Profiles are built on every call and never cached, so rotated
/// credentials take effect on the next connection.
#[derive(Debug, Clone, Copy)]
pub struct ProfileBuilder<'a> {
    config: &'a GatewayConfig,
}

impl<'a> ProfileBuilder<'a> {
    pub fn new(config: &'a GatewayConfig) -> Self {
        Self { config }
    }

    /// Build a profile from a protocol name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` for an unrecognised protocol name.
    pub fn build_named(&self, protocol: &str, cluster: &str) -> Result<SecurityProfile> {
        Ok(self.build(protocol.parse()?, cluster))
    }

    pub fn build(&self, protocol: SecurityProtocol, cluster: &str) -> SecurityProfile {
        let tuning = self.tuning();
        let cluster_cfg = self.config.cluster(cluster);
        let sasl_cfg = &self.config.sasl;
        let tls = || self.config.ssl_for(cluster).clone();

        match protocol {
            SecurityProtocol::Plaintext => SecurityProfile::Plaintext { tuning },
            SecurityProtocol::Ssl => SecurityProfile::Ssl { tls: tls(), tuning },
            SecurityProtocol::SaslPlain => SecurityProfile::SaslPlain {
                sasl: SaslSettings {
                    mechanism: sasl_cfg.plain_mechanism.clone(),
                    jaas_config: cluster_cfg.and_then(|c| c.plain_jaas_config.clone()),
                    kerberos_service_name: None,
                },
                tuning,
            },
            SecurityProtocol::SaslSslPlain => SecurityProfile::SaslSslPlain {
                tls: tls(),
                sasl: SaslSettings {
                    mechanism: sasl_cfg.plain_mechanism.clone(),
                    jaas_config: cluster_cfg.and_then(|c| c.plain_jaas_config.clone()),
                    kerberos_service_name: None,
                },
                tuning,
            },
            SecurityProtocol::SaslSslScram => SecurityProfile::SaslSslScram {
                tls: tls(),
                sasl: SaslSettings {
                    mechanism: sasl_cfg.scram_mechanism.clone(),
                    jaas_config: cluster_cfg.and_then(|c| c.scram_jaas_config.clone()),
                    kerberos_service_name: None,
                },
                tuning,
            },
            SecurityProtocol::SaslSslGssapi => SecurityProfile::SaslSslGssapi {
                tls: tls(),
                sasl: SaslSettings {
                    mechanism: sasl_cfg.gssapi_mechanism.clone(),
                    jaas_config: cluster_cfg.and_then(|c| c.gssapi_jaas_config.clone()),
                    kerberos_service_name: cluster_cfg.and_then(|c| c.gssapi_service_name.clone()),
                },
                tuning,
            },
        }
    }

    fn tuning(&self) -> ClientTuning {
        let admin = &self.config.admin;
        ClientTuning {
            request_timeout: Duration::from_millis(admin.request_timeout_ms),
            connect_timeout: Duration::from_millis(admin.connect_timeout_ms),
            retries: admin.retries,
            retry_backoff: Duration::from_millis(admin.retry_backoff_ms),
        }
    }
}
