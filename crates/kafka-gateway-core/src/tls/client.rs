//! rustls connector built from PEM stores.

use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::ring::default_provider;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector as TokioTlsConnector;
use tracing::{debug, warn};

use crate::config::SslConfig;
use crate::error::{TlsError, TlsResult};

const PEM: &str = "PEM";

/// Install the ring crypto provider if not already installed.
fn ensure_crypto_provider() {
    let _ = CryptoProvider::install_default(default_provider());
}

/// TLS connector for administrative connections to brokers.
#[derive(Clone)]
pub struct TlsConnector {
    inner: TokioTlsConnector,
}

impl TlsConnector {
    /// Create a connector from a cluster's TLS material.
    ///
    /// Without a truststore the Mozilla root set is trusted. Without a
    /// keystore no client certificate is presented.
    ///
    /// # Errors
    ///
    /// Returns an error if a store is not PEM, a file cannot be read, or
    /// rustls rejects the resulting configuration.
    pub fn new(config: &SslConfig) -> TlsResult<Self> {
        ensure_crypto_provider();
        let client_config = build_client_config(config)?;
        Ok(Self {
            inner: TokioTlsConnector::from(Arc::new(client_config)),
        })
    }

    /// Connect to a server over TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the server name is invalid or the handshake fails.
    pub async fn connect(
        &self,
        server_name: &str,
        stream: TcpStream,
    ) -> TlsResult<TlsStream<TcpStream>> {
        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|e| TlsError::Config(format!("invalid server name: {e}")))?;

        debug!("initiating TLS handshake");

        self.inner
            .connect(server_name, stream)
            .await
            .map_err(|e| TlsError::Handshake(e.to_string()))
    }
}

fn check_store_type(store: &'static str, store_type: Option<&str>) -> TlsResult<()> {
    match store_type {
        Some(t) if !t.eq_ignore_ascii_case(PEM) => Err(TlsError::UnsupportedStoreType {
            store,
            store_type: t.to_string(),
        }),
        _ => Ok(()),
    }
}

fn build_client_config(config: &SslConfig) -> TlsResult<ClientConfig> {
    check_store_type("truststore", config.truststore_type.as_deref())?;
    check_store_type("keystore", config.keystore_type.as_deref())?;

    let root_store = build_root_store(config)?;
    let builder = ClientConfig::builder().with_root_certificates(root_store);

    let client_config = match &config.keystore_location {
        Some(keystore) => {
            if config.key_password.is_some() || config.keystore_password.is_some() {
                warn!("keystore passwords are ignored; the PEM key must be unencrypted");
            }
            debug!(path = %keystore.display(), "loading client certificate for mTLS");
            let certs = load_certificates(keystore)?;
            let key = load_private_key(keystore)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| TlsError::Config(format!("failed to configure client auth: {e}")))?
        }
        None => builder.with_no_client_auth(),
    };

    Ok(client_config)
}

fn build_root_store(config: &SslConfig) -> TlsResult<RootCertStore> {
    let mut root_store = RootCertStore::empty();

    match &config.truststore_location {
        Some(path) => {
            let certs = load_certificates(path)?;
            let (added, _ignored) = root_store.add_parsable_certificates(certs);
            debug!(added, path = %path.display(), "loaded truststore");
            if added == 0 {
                return Err(TlsError::NoCertificates(path.display().to_string()));
            }
        }
        None => {
            debug!("no truststore configured, using webpki roots");
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
    }

    Ok(root_store)
}

/// Load every certificate in a PEM file.
pub(crate) fn load_certificates(path: &Path) -> TlsResult<Vec<CertificateDer<'static>>> {
    let file = std::fs::File::open(path).map_err(|e| TlsError::CertificateLoad {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut reader = BufReader::new(file);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .filter_map(|result| match result {
            Ok(cert) => Some(cert),
            Err(e) => {
                warn!(error = %e, "skipping invalid certificate");
                None
            }
        })
        .collect();

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }

    Ok(certs)
}

/// Load the first private key in a PEM file, skipping certificates.
pub(crate) fn load_private_key(path: &Path) -> TlsResult<PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path).map_err(|e| TlsError::PrivateKeyLoad {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut reader = BufReader::new(file);
    match rustls_pemfile::private_key(&mut reader) {
        Ok(Some(key)) => Ok(key),
        Ok(None) => Err(TlsError::NoPrivateKey(path.display().to_string())),
        Err(e) => Err(TlsError::PrivateKeyLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
    }
}
