//! Broker connections owned by one admin client.
//!
//! Holds a bootstrap connection plus lazily opened connections to specific
//! brokers (the controller, in practice) discovered through metadata.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{AdminError, AdminResult};

use super::connection::{BrokerConnection, ConnectionSettings};

/// Manages the connections of one admin client.
pub struct BrokerPool {
    settings: Arc<ConnectionSettings>,
    bootstrap_servers: Vec<String>,
    retries: u32,
    retry_backoff: Duration,
    bootstrap: RwLock<Option<Arc<BrokerConnection>>>,
    /// Connections indexed by broker ID.
    brokers: DashMap<i32, Arc<BrokerConnection>>,
}

impl BrokerPool {
    #[must_use]
    pub fn new(
        bootstrap_servers: Vec<String>,
        settings: Arc<ConnectionSettings>,
        retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            settings,
            bootstrap_servers,
            retries,
            retry_backoff,
            bootstrap: RwLock::new(None),
            brokers: DashMap::new(),
        }
    }

    /// Get a connected bootstrap connection, connecting if needed.
    ///
    /// Each round tries every bootstrap server in order. Up to `retries`
    /// further rounds follow, each after `retry_backoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if every round fails, or immediately for failures
    /// that retrying cannot fix (TLS, authentication, unsupported mechanism).
    pub async fn bootstrap(&self) -> AdminResult<Arc<BrokerConnection>> {
        if let Some(conn) = self.bootstrap.read().await.as_ref() {
            if conn.is_connected().await {
                return Ok(Arc::clone(conn));
            }
        }

        let mut guard = self.bootstrap.write().await;
        if let Some(conn) = guard.as_ref() {
            if conn.is_connected().await {
                return Ok(Arc::clone(conn));
            }
        }

        let rounds = self.retries.saturating_add(1);
        for round in 1..=rounds {
            for server in &self.bootstrap_servers {
                let conn = BrokerConnection::new(server.clone(), Arc::clone(&self.settings));
                match conn.connect().await {
                    Ok(()) => {
                        info!(server = %server, round, "connected to bootstrap server");
                        let conn = Arc::new(conn);
                        *guard = Some(Arc::clone(&conn));
                        return Ok(conn);
                    }
                    Err(e @ (AdminError::Authentication(_)
                    | AdminError::Unsupported(_)
                    | AdminError::Tls(_))) => {
                        warn!(server = %server, error = %e, "bootstrap server rejected connection");
                        return Err(e);
                    }
                    Err(e) => {
                        warn!(server = %server, error = %e, "failed to connect to bootstrap server");
                    }
                }
            }
            if round < rounds {
                debug!(round, backoff_ms = self.retry_backoff.as_millis() as u64, "retrying bootstrap");
                tokio::time::sleep(self.retry_backoff).await;
            }
        }

        Err(AdminError::NoBrokersAvailable { attempts: rounds })
    }

    /// Get a connection to a specific broker, connecting on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker cannot be reached.
    pub async fn broker(&self, broker_id: i32, address: &str) -> AdminResult<Arc<BrokerConnection>> {
        if let Some(conn) = self.brokers.get(&broker_id).map(|c| Arc::clone(c.value())) {
            if conn.address() == address && conn.is_connected().await {
                return Ok(conn);
            }
            self.forget(broker_id).await;
        }

        let conn = Arc::new(BrokerConnection::new(address.to_string(), Arc::clone(&self.settings)));
        conn.connect().await?;
        debug!(broker_id, address, "connected to broker");
        self.brokers.insert(broker_id, Arc::clone(&conn));
        Ok(conn)
    }

    /// Drop the connection to a broker.
    pub async fn forget(&self, broker_id: i32) {
        if let Some((_, conn)) = self.brokers.remove(&broker_id) {
            conn.disconnect().await;
        }
    }

    /// Close every connection.
    pub async fn close(&self) {
        if let Some(conn) = self.bootstrap.write().await.take() {
            conn.disconnect().await;
        }
        let ids: Vec<i32> = self.brokers.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.forget(id).await;
        }
    }
}
