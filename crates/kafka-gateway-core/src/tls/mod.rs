//! TLS for outbound broker connections.
//!
//! Material is read from PEM files named in [`SslConfig`](crate::config::SslConfig).
//! A PEM keystore carries the client certificate chain and its private key in
//! one file; the truststore carries the CA certificates to trust.
//!
//! ```rust,ignore
//! use kafka_gateway_core::tls::TlsConnector;
//!
//! let connector = TlsConnector::new(&config.ssl)?;
//! let tls_stream = connector.connect("kafka.example.com", tcp_stream).await?;
//! ```

pub mod client;

pub use client::TlsConnector;
