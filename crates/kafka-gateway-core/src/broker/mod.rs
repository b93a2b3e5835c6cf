//! Broker connections for the native admin client.
//!
//! - [`BrokerConnection`]: one socket with correlation tracking, TLS and SASL
//! - [`BrokerPool`]: bootstrap with retry rounds plus per-broker connections
//! - [`BrokerStream`]: plain or TLS transport

pub mod connection;
pub mod pool;
pub mod stream;

pub use connection::{BrokerConnection, ConnectionSettings, SaslCredentials};
pub use pool::BrokerPool;
pub use stream::BrokerStream;
