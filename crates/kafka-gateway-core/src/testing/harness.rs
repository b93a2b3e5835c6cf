//! Gateway wired to an in-memory cluster.

use std::sync::Arc;

use crate::admin::AdminClientFactory;
use crate::cache::ClusterTarget;
use crate::config::{AdminConfig, GatewayConfig};
use crate::gateway::Gateway;
use crate::security::SecurityProtocol;

use super::cluster::{InMemoryCluster, MockAdminFactory};

/// Default bootstrap list used by [`GatewayHarness::target`].
pub const TEST_HOSTS: &str = "broker-1:9092,broker-2:9092";

/// A [`Gateway`] whose connections all reach one [`InMemoryCluster`].
pub struct GatewayHarness {
    pub gateway: Gateway,
    pub factory: Arc<MockAdminFactory>,
    pub cluster: Arc<InMemoryCluster>,
}

impl GatewayHarness {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: GatewayConfig) -> Self {
        let cluster = InMemoryCluster::shared();
        let factory = Arc::new(MockAdminFactory::new(Arc::clone(&cluster)));
        let dyn_factory: Arc<dyn AdminClientFactory> = factory.clone();
        let gateway = Gateway::with_factory(config, dyn_factory).expect("test config is valid");
        Self {
            gateway,
            factory,
            cluster,
        }
    }

    /// Plaintext target on [`TEST_HOSTS`] in cluster "dev".
    pub fn target(&self) -> ClusterTarget {
        ClusterTarget::new(TEST_HOSTS, SecurityProtocol::Plaintext, "dev")
    }
}

impl Default for GatewayHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration with short bounded waits and no retries.
pub fn fast_config() -> GatewayConfig {
    GatewayConfig {
        admin: AdminConfig {
            request_timeout_ms: 500,
            retries: 0,
            retry_backoff_ms: 10,
            connect_timeout_ms: 200,
            operation_timeout_ms: 300,
            probe_timeout_ms: 300,
        },
        ..Default::default()
    }
}
