//! Wires the components together from one configuration.

use std::sync::Arc;

use tracing::info;

use crate::acl::AclReconciler;
use crate::admin::{AdminClientFactory, KafkaAdminFactory};
use crate::cache::ConnectionCache;
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::health::HealthProbe;
use crate::rest::RestClient;
use crate::topics::TopicManager;

/// The shared cache plus the three services built on it.
pub struct Gateway {
    config: Arc<GatewayConfig>,
    cache: Arc<ConnectionCache>,
    topics: TopicManager,
    acls: AclReconciler,
    health: HealthProbe,
}

impl Gateway {
    /// Gateway backed by the native Kafka admin client.
    ///
    /// # Errors
    ///
    /// `ConfigMissing` if the configuration is invalid or the REST TLS
    /// material cannot be loaded.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        Self::with_factory(config, Arc::new(KafkaAdminFactory))
    }

    /// Gateway with a caller-supplied admin client factory.
    ///
    /// # Errors
    ///
    /// As for [`Gateway::new`].
    pub fn with_factory(config: GatewayConfig, factory: Arc<dyn AdminClientFactory>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let operation_timeout = config.admin.operation_timeout();

        let cache = Arc::new(ConnectionCache::new(Arc::clone(&config), factory));
        let rest = RestClient::new(&config.rest, &config.ssl)?;

        info!(
            operation_timeout_ms = config.admin.operation_timeout_ms,
            probe_timeout_ms = config.admin.probe_timeout_ms,
            clusters = config.clusters.len(),
            "gateway initialized"
        );

        Ok(Self {
            topics: TopicManager::new(Arc::clone(&cache), operation_timeout),
            acls: AclReconciler::new(Arc::clone(&cache), operation_timeout),
            health: HealthProbe::new(
                Arc::clone(&cache),
                rest,
                config.rest.clone(),
                config.admin.probe_timeout(),
            ),
            cache,
            config,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ConnectionCache> {
        &self.cache
    }

    pub fn topics(&self) -> &TopicManager {
        &self.topics
    }

    pub fn acls(&self) -> &AclReconciler {
        &self.acls
    }

    pub fn health(&self) -> &HealthProbe {
        &self.health
    }

    /// Close every cached connection.
    pub async fn shutdown(&self) {
        self.cache.close_all().await;
        info!("gateway shut down");
    }
}
