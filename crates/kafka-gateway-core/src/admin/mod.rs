//! The administrative client seam.
//!
//! [`AdminClient`] is the narrow set of cluster calls the gateway needs.
//! [`AdminClientFactory`] turns a bootstrap list and a
//! [`SecurityProfile`](crate::security::SecurityProfile) into a client handle.
//! [`KafkaAdminClient`] speaks the Kafka protocol directly; tests substitute
//! the in-memory doubles from [`testing`](crate::testing).

pub mod kafka;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::acl::{AclBindingFilter, AclBindingSpec};
use crate::error::AdminResult;
use crate::security::SecurityProfile;

pub use kafka::{KafkaAdminClient, KafkaAdminFactory};

/// Shared handle to a live admin client.
pub type AdminHandle = Arc<dyn AdminClient>;

/// Topic as reported by cluster metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicDescription {
    pub name: String,
    pub partitions: i32,
    /// Replica count of partition 0.
    pub replication_factor: i16,
    pub internal: bool,
}

/// Topic to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTopic {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i16,
}

/// Cluster calls made by the gateway.
///
/// Broker-side failures come back as [`AdminError::Broker`](crate::error::AdminError::Broker)
/// carrying the Kafka error code: creating an existing topic yields
/// TOPIC_ALREADY_EXISTS, deleting a missing one UNKNOWN_TOPIC_OR_PARTITION.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Cheapest round trip that proves the cluster answers.
    async fn probe(&self) -> AdminResult<()> {
        self.list_topics().await.map(|_| ())
    }

    /// Names of all non-internal topics.
    async fn list_topics(&self) -> AdminResult<Vec<String>>;

    /// Every topic with its partition count.
    async fn describe_topics(&self) -> AdminResult<Vec<TopicDescription>>;

    /// One topic, or `None` if it does not exist.
    async fn describe_topic(&self, name: &str) -> AdminResult<Option<TopicDescription>>;

    async fn create_topic(&self, topic: &NewTopic) -> AdminResult<()>;

    /// Grow a topic to `total_count` partitions.
    async fn create_partitions(&self, name: &str, total_count: i32) -> AdminResult<()>;

    async fn delete_topic(&self, name: &str) -> AdminResult<()>;

    async fn describe_acls(&self, filter: &AclBindingFilter) -> AdminResult<Vec<AclBindingSpec>>;

    /// Create all bindings in one request.
    async fn create_acls(&self, bindings: &[AclBindingSpec]) -> AdminResult<()>;

    /// Delete everything matching any filter; returns what was removed.
    async fn delete_acls(&self, filters: &[AclBindingFilter]) -> AdminResult<Vec<AclBindingSpec>>;

    /// Release connections. Later calls fail.
    async fn close(&self);
}

/// Builds admin clients. Construction should not block on the network;
/// the connection cache probes every new handle before keeping it.
#[async_trait]
pub trait AdminClientFactory: Send + Sync {
    async fn create(&self, bootstrap: &[String], profile: &SecurityProfile) -> AdminResult<AdminHandle>;
}
