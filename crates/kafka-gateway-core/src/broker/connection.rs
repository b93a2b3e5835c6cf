//! Single authenticated broker connection.
//!
//! Manages a TCP connection to one broker with correlation ID tracking for
//! request/response matching. TLS and SASL are applied on connect according
//! to the [`ConnectionSettings`] derived from a security profile.

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use kafka_protocol::messages::{
    RequestHeader, ResponseHeader, SaslAuthenticateRequest, SaslHandshakeRequest,
};
use kafka_protocol::protocol::{Decodable, Encodable, HeaderVersion, Request, StrBytes};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::auth::{plain_auth_bytes, ScramClient, ScramHash, ScramSha256, ScramSha512};
use crate::error::{AdminError, AdminResult};
use crate::security::{SaslMechanism, SecurityProfile};
use crate::tls::TlsConnector;

use super::stream::BrokerStream;

const SASL_HANDSHAKE_VERSION: i16 = 1;
const SASL_AUTHENTICATE_VERSION: i16 = 2;

/// Upper bound on a response frame, guards against reading garbage lengths.
const MAX_RESPONSE_SIZE: usize = 100 * 1024 * 1024;

/// Username and password for the SASL handshake.
#[derive(Clone)]
pub struct SaslCredentials {
    pub mechanism: SaslMechanism,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SaslCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslCredentials")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Transport and authentication settings shared by every connection of
/// one admin client.
#[derive(Clone)]
pub struct ConnectionSettings {
    pub client_id: &'static str,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub tls: Option<Arc<TlsConnector>>,
    pub sasl: Option<SaslCredentials>,
}

impl ConnectionSettings {
    /// Plain TCP with the given timeouts.
    pub fn plaintext(client_id: &'static str, connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            client_id,
            connect_timeout,
            request_timeout,
            tls: None,
            sasl: None,
        }
    }

    /// Prepare TLS and SASL material from a profile.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS material cannot be loaded, SASL credentials
    /// are missing from the JAAS config, or the mechanism is not supported.
    pub fn from_profile(profile: &SecurityProfile) -> AdminResult<Self> {
        let tuning = profile.tuning();
        let mut settings =
            Self::plaintext(profile.client_id(), tuning.connect_timeout, tuning.request_timeout);

        if let Some(tls) = profile.tls() {
            settings.tls = Some(Arc::new(TlsConnector::new(tls)?));
        }

        if let (Some(sasl), Some(default)) = (profile.sasl(), profile.default_mechanism()) {
            let mechanism = sasl.mechanism_or(default)?;
            if mechanism == SaslMechanism::Gssapi {
                return Err(AdminError::Unsupported(
                    "GSSAPI authentication is not implemented by the native admin client".to_string(),
                ));
            }
            let creds = sasl.credentials().ok_or_else(|| {
                AdminError::Config(format!(
                    "{} requires username and password in the JAAS config",
                    profile.protocol()
                ))
            })?;
            settings.sasl = Some(SaslCredentials {
                mechanism,
                username: creds.username,
                password: creds.password,
            });
        }

        Ok(settings)
    }
}

/// A connection to a single Kafka broker.
pub struct BrokerConnection {
    address: String,
    settings: Arc<ConnectionSettings>,
    stream: Mutex<Option<BrokerStream>>,
    correlation_id: AtomicI32,
}

impl BrokerConnection {
    /// Create a new broker connection (not yet connected).
    #[must_use]
    pub fn new(address: String, settings: Arc<ConnectionSettings>) -> Self {
        Self {
            address,
            settings,
            stream: Mutex::new(None),
            correlation_id: AtomicI32::new(0),
        }
    }

    /// Get the broker address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Check if the connection is established.
    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    /// Connect to the broker.
    ///
    /// Establishes a TCP connection, then performs the TLS handshake and
    /// SASL authentication if the settings call for them.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails, times out, or authentication fails.
    #[instrument(skip(self), fields(address = %self.address, tls = self.settings.tls.is_some()))]
    pub async fn connect(&self) -> AdminResult<()> {
        let tcp_stream =
            match timeout(self.settings.connect_timeout, TcpStream::connect(&self.address)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    warn!(error = %e, "failed to connect to broker");
                    return Err(self.unavailable(e.to_string()));
                }
                Err(_) => {
                    warn!("connection timeout");
                    return Err(self.unavailable("connection timeout"));
                }
            };

        debug!("TCP connection established");

        let stream = match &self.settings.tls {
            Some(connector) => {
                let server_name = host_of(&self.address);
                debug!(server_name, "performing TLS handshake");
                let tls_stream = connector
                    .connect(server_name, tcp_stream)
                    .await
                    .map_err(|e| self.unavailable(e.to_string()))?;
                BrokerStream::tls(tls_stream)
            }
            None => BrokerStream::plain(tcp_stream),
        };

        *self.stream.lock().await = Some(stream);

        if let Some(sasl) = &self.settings.sasl {
            if let Err(e) = self.authenticate(sasl).await {
                self.disconnect().await;
                return Err(e);
            }
        }

        debug!("connected to broker");
        Ok(())
    }

    /// Disconnect from the broker.
    pub async fn disconnect(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.shutdown().await;
        }
    }

    /// Encode `request` at `api_version`, send it, and decode the response.
    ///
    /// # Errors
    ///
    /// Returns an error on encode/decode failure, I/O failure, timeout or
    /// correlation mismatch.
    pub async fn call<R>(&self, request: &R, api_version: i16) -> AdminResult<R::Response>
    where
        R: Request,
    {
        let header = RequestHeader::default()
            .with_request_api_key(R::KEY)
            .with_request_api_version(api_version)
            .with_correlation_id(self.next_correlation_id())
            .with_client_id(Some(StrBytes::from_static_str(self.settings.client_id)));

        let mut buf = BytesMut::new();
        header
            .encode(&mut buf, R::header_version(api_version))
            .map_err(|e| AdminError::ProtocolEncode {
                message: format!("api {} header: {e}", R::KEY),
            })?;
        request
            .encode(&mut buf, api_version)
            .map_err(|e| AdminError::ProtocolEncode {
                message: format!("api {} v{api_version} body: {e}", R::KEY),
            })?;

        let mut response = self.send_request(&buf).await?;

        ResponseHeader::decode(&mut response, R::Response::header_version(api_version)).map_err(
            |e| AdminError::ProtocolDecode {
                message: format!("api {} response header: {e}", R::KEY),
            },
        )?;
        R::Response::decode(&mut response, api_version).map_err(|e| AdminError::ProtocolDecode {
            message: format!("api {} v{api_version} response: {e}", R::KEY),
        })
    }

    /// Send a framed request and receive the response.
    ///
    /// `request_bytes` holds the request header and body without the length
    /// prefix. The returned bytes start at the response correlation id.
    /// A failed or timed-out exchange drops the stream, since its framing
    /// can no longer be trusted.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is not established, I/O fails,
    /// the request times out or the correlation ID doesn't match.
    #[instrument(skip(self, request_bytes), fields(address = %self.address))]
    pub async fn send_request(&self, request_bytes: &[u8]) -> AdminResult<Bytes> {
        if request_bytes.len() < 8 {
            return Err(AdminError::ProtocolEncode {
                message: "request too short".to_string(),
            });
        }
        let correlation_id = i32::from_be_bytes([
            request_bytes[4],
            request_bytes[5],
            request_bytes[6],
            request_bytes[7],
        ]);

        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| self.unavailable("not connected"))?;

        debug!(correlation_id, request_len = request_bytes.len(), "sending request");

        let mut write_buf = BytesMut::with_capacity(4 + request_bytes.len());
        write_buf.put_u32(request_bytes.len() as u32);
        write_buf.extend_from_slice(request_bytes);

        let exchange = async {
            stream.write_all(&write_buf).await?;
            stream.flush().await?;

            let mut len_buf = [0u8; 4];
            stream.read_exact(&mut len_buf).await?;
            let response_len = u32::from_be_bytes(len_buf) as usize;
            if response_len < 4 || response_len > MAX_RESPONSE_SIZE {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("invalid response length {response_len}"),
                ));
            }

            let mut response_buf = vec![0u8; response_len];
            stream.read_exact(&mut response_buf).await?;
            Ok::<_, std::io::Error>(response_buf)
        };

        let response_buf = match timeout(self.settings.request_timeout, exchange).await {
            Ok(Ok(buf)) => buf,
            Ok(Err(e)) => {
                *guard = None;
                return Err(AdminError::Connection(e));
            }
            Err(_) => {
                *guard = None;
                return Err(AdminError::Timeout {
                    timeout_ms: self.settings.request_timeout.as_millis() as u64,
                });
            }
        };

        let response_correlation_id = i32::from_be_bytes([
            response_buf[0],
            response_buf[1],
            response_buf[2],
            response_buf[3],
        ]);

        if response_correlation_id != correlation_id {
            *guard = None;
            return Err(AdminError::CorrelationIdMismatch {
                expected: correlation_id,
                actual: response_correlation_id,
            });
        }

        debug!(correlation_id, response_len = response_buf.len(), "received response");

        Ok(Bytes::from(response_buf))
    }

    /// Generate a new correlation ID.
    #[must_use]
    pub fn next_correlation_id(&self) -> i32 {
        self.correlation_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn authenticate(&self, sasl: &SaslCredentials) -> AdminResult<()> {
        let mechanism = sasl.mechanism.mechanism_name();
        debug!(mechanism, "performing SASL handshake");

        let handshake = self
            .call(
                &SaslHandshakeRequest::default()
                    .with_mechanism(StrBytes::from_static_str(mechanism)),
                SASL_HANDSHAKE_VERSION,
            )
            .await?;

        if handshake.error_code != 0 {
            let supported: Vec<String> = handshake.mechanisms.iter().map(|m| m.to_string()).collect();
            return Err(AdminError::Authentication(format!(
                "mechanism {mechanism} rejected (error code {}), broker supports {supported:?}",
                handshake.error_code
            )));
        }

        match sasl.mechanism {
            SaslMechanism::Plain => {
                self.sasl_round_trip(plain_auth_bytes(&sasl.username, &sasl.password))
                    .await?;
            }
            SaslMechanism::ScramSha256 => {
                self.authenticate_scram::<ScramSha256>(&sasl.username, &sasl.password)
                    .await?;
            }
            SaslMechanism::ScramSha512 => {
                self.authenticate_scram::<ScramSha512>(&sasl.username, &sasl.password)
                    .await?;
            }
            SaslMechanism::Gssapi => {
                return Err(AdminError::Unsupported(
                    "GSSAPI authentication is not implemented by the native admin client".to_string(),
                ));
            }
        }

        debug!(mechanism, "SASL authentication completed");
        Ok(())
    }

    async fn authenticate_scram<H: ScramHash>(&self, username: &str, password: &str) -> AdminResult<()> {
        let client = ScramClient::<H>::new(username, password);

        let server_first = self.sasl_round_trip(client.client_first().into_bytes()).await?;
        let server_first = String::from_utf8(server_first.to_vec())
            .map_err(|_| AdminError::Authentication("server-first-message is not UTF-8".to_string()))?;

        let (client_final, verifier) = client.client_final(&server_first)?;

        let server_final = self.sasl_round_trip(client_final.into_bytes()).await?;
        let server_final = String::from_utf8(server_final.to_vec())
            .map_err(|_| AdminError::Authentication("server-final-message is not UTF-8".to_string()))?;

        verifier.verify(&server_final)
    }

    /// One SaslAuthenticate exchange, returning the server's auth bytes.
    async fn sasl_round_trip(&self, auth_bytes: Vec<u8>) -> AdminResult<Bytes> {
        let response = self
            .call(
                &SaslAuthenticateRequest::default().with_auth_bytes(Bytes::from(auth_bytes)),
                SASL_AUTHENTICATE_VERSION,
            )
            .await?;

        if response.error_code != 0 {
            let message = response
                .error_message
                .map(|s| s.to_string())
                .unwrap_or_else(|| "authentication failed".to_string());
            return Err(AdminError::Authentication(format!(
                "error code {}: {message}",
                response.error_code
            )));
        }
        Ok(response.auth_bytes)
    }

    fn unavailable(&self, message: impl Into<String>) -> AdminError {
        AdminError::BrokerUnavailable {
            address: self.address.clone(),
            message: message.into(),
        }
    }
}

/// Host part of `host:port`, tolerating bracketed IPv6 literals.
fn host_of(address: &str) -> &str {
    if let Some(rest) = address.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match address.rsplit_once(':') {
        Some((host, _)) => host,
        None => address,
    }
}
