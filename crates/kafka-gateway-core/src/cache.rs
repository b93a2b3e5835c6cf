//! Process-wide cache of probed admin connections.
//!
//! One slot per [`ConnectionKey`]. A slot is an async mutex, so the
//! check-probe-create sequence for a key runs one caller at a time while
//! different keys proceed independently.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::admin::{AdminClientFactory, AdminHandle};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::security::{ProfileBuilder, SecurityProtocol};

/// Where an operation should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTarget {
    hosts: Vec<String>,
    protocol: SecurityProtocol,
    cluster: String,
}

impl ClusterTarget {
    /// `hosts` is a comma-separated bootstrap list. Blank entries are dropped.
    pub fn new(hosts: &str, protocol: SecurityProtocol, cluster: impl Into<String>) -> Self {
        Self {
            hosts: hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect(),
            protocol,
            cluster: cluster.into(),
        }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn protocol(&self) -> SecurityProtocol {
        self.protocol
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(self.protocol, &self.cluster, &self.hosts)
    }
}

/// Cache identity. The host list is hashed so keys stay small and log
/// lines carry no endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    protocol: SecurityProtocol,
    cluster: String,
    host_hash: String,
}

impl ConnectionKey {
    /// Host order, duplicates and surrounding whitespace do not change the key.
    pub fn new(protocol: SecurityProtocol, cluster: &str, hosts: &[String]) -> Self {
        let mut normalized: Vec<&str> = hosts.iter().map(|h| h.trim()).filter(|h| !h.is_empty()).collect();
        normalized.sort_unstable();
        normalized.dedup();
        let digest = Sha256::digest(normalized.join(",").as_bytes());

        Self {
            protocol,
            cluster: cluster.trim().to_lowercase(),
            host_hash: BASE64.encode(digest),
        }
    }

    pub fn protocol(&self) -> SecurityProtocol {
        self.protocol
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn host_hash(&self) -> &str {
        &self.host_hash
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.protocol, self.cluster, &self.host_hash[..12])
    }
}

/// A live handle that passed its liveness probe.
#[derive(Clone)]
pub struct CachedConnection {
    pub key: ConnectionKey,
    pub handle: AdminHandle,
    pub created_at: Instant,
}

impl fmt::Debug for CachedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedConnection")
            .field("key", &self.key)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

type Slot = Arc<Mutex<Option<CachedConnection>>>;

pub struct ConnectionCache {
    config: Arc<GatewayConfig>,
    factory: Arc<dyn AdminClientFactory>,
    slots: DashMap<ConnectionKey, Slot>,
    probe_timeout: Duration,
    max_entries: Option<usize>,
}

impl ConnectionCache {
    pub fn new(config: Arc<GatewayConfig>, factory: Arc<dyn AdminClientFactory>) -> Self {
        let probe_timeout = config.admin.probe_timeout();
        let max_entries = config.cache.max_entries;
        Self {
            config,
            factory,
            slots: DashMap::new(),
            probe_timeout,
            max_entries,
        }
    }

    /// Return a probed handle for `target`, creating one if needed.
    ///
    /// A cached handle that fails its probe is closed and evicted before a
    /// replacement is built. A replacement that fails its probe is closed
    /// and nothing is kept.
    ///
    /// # Errors
    ///
    /// `Unreachable` when no handle passes the probe, `ConfigMissing` when
    /// the profile's TLS or SASL material is unusable.
    #[instrument(skip(self, target), fields(key = %target.key()))]
    pub async fn get_connection(&self, target: &ClusterTarget) -> Result<AdminHandle> {
        let key = target.key();
        let slot = Arc::clone(
            self.slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .value(),
        );
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref().map(|c| Arc::clone(&c.handle)) {
            match self.probe(&cached).await {
                Ok(()) => return Ok(cached),
                Err(e) => {
                    warn!(error = %e, "cached connection failed probe, evicting");
                    if let Some(stale) = entry.take() {
                        stale.handle.close().await;
                    }
                }
            }
        }

        let profile = ProfileBuilder::new(&self.config).build(target.protocol(), target.cluster());
        let created = match self.factory.create(target.hosts(), &profile).await {
            Ok(handle) => match self.probe(&handle).await {
                Ok(()) => Ok(handle),
                Err(e) => {
                    handle.close().await;
                    Err(e)
                }
            },
            Err(e) => Err(GatewayError::from(e)),
        };

        match created {
            Ok(handle) => {
                *entry = Some(CachedConnection {
                    key: key.clone(),
                    handle: Arc::clone(&handle),
                    created_at: Instant::now(),
                });
                drop(entry);
                info!("admin connection established");
                self.enforce_bound(&key).await;
                Ok(handle)
            }
            Err(e) => {
                drop(entry);
                drop(slot);
                self.discard_empty_slot(&key);
                Err(e)
            }
        }
    }

    /// Close and forget the handle for `target`, if any.
    pub async fn evict(&self, target: &ClusterTarget) {
        let key = target.key();
        let Some(slot) = self.slots.get(&key).map(|s| Arc::clone(s.value())) else {
            return;
        };
        if let Some(cached) = slot.lock().await.take() {
            cached.handle.close().await;
            debug!(key = %key, "connection evicted");
        }
        drop(slot);
        self.discard_empty_slot(&key);
    }

    /// Number of keys with a live handle.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.value().try_lock().map_or(true, |g| g.is_some()))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every cached handle.
    pub async fn close_all(&self) {
        let slots: Vec<Slot> = self.slots.iter().map(|s| Arc::clone(s.value())).collect();
        self.slots.clear();
        for slot in slots {
            if let Some(cached) = slot.lock().await.take() {
                cached.handle.close().await;
            }
        }
    }

    async fn probe(&self, handle: &AdminHandle) -> Result<()> {
        match timeout(self.probe_timeout, handle.probe()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(GatewayError::unreachable(format!("liveness probe failed: {e}"))),
            Err(_) => Err(GatewayError::unreachable(format!(
                "liveness probe timed out after {}ms",
                self.probe_timeout.as_millis()
            ))),
        }
    }

    /// Remove a slot nobody else is using and that holds no handle.
    fn discard_empty_slot(&self, key: &ConnectionKey) {
        self.slots.remove_if(key, |_, slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|g| g.is_none())
        });
    }

    /// Evict the oldest handle other than `keep` while over the bound.
    async fn enforce_bound(&self, keep: &ConnectionKey) {
        let Some(max) = self.max_entries else {
            return;
        };
        while self.len() > max {
            let oldest = self
                .slots
                .iter()
                .filter(|s| s.key() != keep)
                .filter_map(|s| {
                    let created_at = s.value().try_lock().ok()?.as_ref()?.created_at;
                    Some((s.key().clone(), Arc::clone(s.value()), created_at))
                })
                .min_by_key(|(_, _, created_at)| *created_at);

            let Some((key, slot, _)) = oldest else {
                return;
            };
            if let Some(cached) = slot.lock().await.take() {
                info!(key = %key, max, "cache bound reached, closing oldest connection");
                cached.handle.close().await;
            }
            drop(slot);
            self.discard_empty_slot(&key);
        }
    }
}
