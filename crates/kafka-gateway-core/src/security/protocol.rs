use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AdminError, GatewayError};

/// Security protocol for an administrative connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum SecurityProtocol {
    /// Plain TCP without encryption or authentication.
    #[serde(rename = "PLAINTEXT")]
    Plaintext,
    /// TLS, optionally with a client certificate.
    #[serde(rename = "SSL")]
    Ssl,
    /// SASL/PLAIN over plain TCP.
    #[serde(rename = "SASL_PLAIN")]
    SaslPlain,
    /// SASL/PLAIN over TLS.
    #[serde(rename = "SASL_SSL-PLAINMECHANISM")]
    SaslSslPlain,
    /// SASL/SCRAM over TLS.
    #[serde(rename = "SASL_SSL-SCRAMMECHANISM")]
    SaslSslScram,
    /// SASL/GSSAPI (Kerberos) over TLS.
    #[serde(rename = "SASL_SSL-GSSAPIMECHANISM")]
    SaslSslGssapi,
}

impl SecurityProtocol {
    pub const ALL: [SecurityProtocol; 6] = [
        SecurityProtocol::Plaintext,
        SecurityProtocol::Ssl,
        SecurityProtocol::SaslPlain,
        SecurityProtocol::SaslSslPlain,
        SecurityProtocol::SaslSslScram,
        SecurityProtocol::SaslSslGssapi,
    ];

    /// The name callers use to address this protocol.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Plaintext => "PLAINTEXT",
            Self::Ssl => "SSL",
            Self::SaslPlain => "SASL_PLAIN",
            Self::SaslSslPlain => "SASL_SSL-PLAINMECHANISM",
            Self::SaslSslScram => "SASL_SSL-SCRAMMECHANISM",
            Self::SaslSslGssapi => "SASL_SSL-GSSAPIMECHANISM",
        }
    }

    /// Client id presented to the broker.
    #[must_use]
    pub fn client_id(&self) -> &'static str {
        match self {
            Self::Plaintext => "klawclient",
            Self::Ssl => "klawclientssl",
            Self::SaslPlain => "klawclientsaslplain",
            Self::SaslSslPlain => "klawclientsaslsslplain",
            Self::SaslSslScram => "klawclientsaslsslscram",
            Self::SaslSslGssapi => "klawclientsaslsslgssapi",
        }
    }

    /// Check if TLS is required for this protocol.
    #[must_use]
    pub fn requires_tls(&self) -> bool {
        !matches!(self, Self::Plaintext | Self::SaslPlain)
    }

    /// Check if SASL is required for this protocol.
    #[must_use]
    pub fn requires_sasl(&self) -> bool {
        !matches!(self, Self::Plaintext | Self::Ssl)
    }
}

impl fmt::Display for SecurityProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SecurityProtocol {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s.trim())
            .ok_or_else(|| GatewayError::config_missing(format!("unknown security protocol '{s}'")))
    }
}

/// SASL mechanism spoken during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
    Gssapi,
}

impl SaslMechanism {
    /// Get the Kafka mechanism name as used in the SASL handshake.
    #[must_use]
    pub fn mechanism_name(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::ScramSha512 => "SCRAM-SHA-512",
            Self::Gssapi => "GSSAPI",
        }
    }
}

impl FromStr for SaslMechanism {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLAIN" => Ok(Self::Plain),
            "SCRAM-SHA-256" => Ok(Self::ScramSha256),
            "SCRAM-SHA-512" => Ok(Self::ScramSha512),
            "GSSAPI" => Ok(Self::Gssapi),
            other => Err(AdminError::Unsupported(format!(
                "SASL mechanism '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_protocol_names_round_trip() {
        for protocol in SecurityProtocol::ALL {
            assert_eq!(protocol.name().parse::<SecurityProtocol>().unwrap(), protocol);
        }
    }

    #[test]
    fn test_unknown_protocol_is_config_missing() {
        let err = "SASL_SSL".parse::<SecurityProtocol>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigMissing);
        assert!("plaintext".parse::<SecurityProtocol>().is_err());
    }

    #[test]
    fn test_protocol_serde_names() {
        let p: SecurityProtocol = serde_yaml::from_str("SASL_SSL-SCRAMMECHANISM").unwrap();
        assert_eq!(p, SecurityProtocol::SaslSslScram);
        assert_eq!(
            serde_yaml::to_string(&SecurityProtocol::SaslPlain).unwrap().trim(),
            "SASL_PLAIN"
        );
    }

    #[test]
    fn test_security_protocol_methods() {
        assert!(!SecurityProtocol::Plaintext.requires_tls());
        assert!(!SecurityProtocol::Plaintext.requires_sasl());

        assert!(SecurityProtocol::Ssl.requires_tls());
        assert!(!SecurityProtocol::Ssl.requires_sasl());

        assert!(!SecurityProtocol::SaslPlain.requires_tls());
        assert!(SecurityProtocol::SaslPlain.requires_sasl());

        for p in [
            SecurityProtocol::SaslSslPlain,
            SecurityProtocol::SaslSslScram,
            SecurityProtocol::SaslSslGssapi,
        ] {
            assert!(p.requires_tls());
            assert!(p.requires_sasl());
        }
    }

    #[test]
    fn test_client_ids() {
        assert_eq!(SecurityProtocol::Ssl.client_id(), "klawclientssl");
        assert_eq!(
            SecurityProtocol::SaslSslScram.client_id(),
            "klawclientsaslsslscram"
        );
    }

    #[test]
    fn test_sasl_mechanism_parsing() {
        assert_eq!("PLAIN".parse::<SaslMechanism>().unwrap(), SaslMechanism::Plain);
        assert_eq!(
            "scram-sha-512".parse::<SaslMechanism>().unwrap(),
            SaslMechanism::ScramSha512
        );
        assert_eq!(
            SaslMechanism::ScramSha256.mechanism_name(),
            "SCRAM-SHA-256"
        );
        assert!(matches!(
            "OAUTHBEARER".parse::<SaslMechanism>(),
            Err(AdminError::Unsupported(_))
        ));
    }
}
