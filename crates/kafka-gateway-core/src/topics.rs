//! Topic lifecycle: create, resize, delete and list.
//!
//! Every mutation runs under one manager-wide lock, so at most one topic
//! change is in flight per process.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::admin::{AdminHandle, NewTopic};
use crate::cache::{ClusterTarget, ConnectionCache};
use crate::error::{AdminResult, GatewayError, Result};

/// Longest topic name Kafka accepts.
pub const MAX_TOPIC_NAME_LEN: usize = 249;

/// Topics hidden from listings.
const SCHEMAS_TOPIC: &str = "_schemas";
const CONFLUENT_PREFIX: &str = "_confluent";

/// Check a topic name against Kafka's naming rules.
///
/// # Errors
///
/// Returns `Invalid` for an empty, overlong or reserved name, or one with
/// characters outside `[a-zA-Z0-9._-]`.
pub fn validate_topic_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(GatewayError::invalid("topic name is empty"));
    }
    if name.len() > MAX_TOPIC_NAME_LEN {
        return Err(GatewayError::invalid(format!(
            "topic name is longer than {MAX_TOPIC_NAME_LEN} characters"
        )));
    }
    if name == "." || name == ".." {
        return Err(GatewayError::invalid(format!("topic name '{name}' is reserved")));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(GatewayError::invalid(format!(
            "topic name contains illegal character {bad:?}"
        )));
    }
    Ok(())
}

/// Validated topic shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRequest {
    name: String,
    partitions: i32,
    replication_factor: i16,
}

impl TopicRequest {
    /// # Errors
    ///
    /// Returns `Invalid` for a bad name or a non-positive count.
    pub fn new(name: impl Into<String>, partitions: i32, replication_factor: i16) -> Result<Self> {
        let name = name.into();
        validate_topic_name(&name)?;
        if partitions < 1 {
            return Err(GatewayError::invalid(format!(
                "partition count must be positive, got {partitions}"
            )));
        }
        if replication_factor < 1 {
            return Err(GatewayError::invalid(format!(
                "replication factor must be positive, got {replication_factor}"
            )));
        }
        Ok(Self {
            name,
            partitions,
            replication_factor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partitions(&self) -> i32 {
        self.partitions
    }

    pub fn replication_factor(&self) -> i16 {
        self.replication_factor
    }

    fn to_new_topic(&self) -> NewTopic {
        NewTopic {
            name: self.name.clone(),
            partitions: self.partitions,
            replication_factor: self.replication_factor,
        }
    }
}

/// What [`TopicManager::update_topic`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopicUpdate {
    /// Requested count equals the current one.
    Unchanged { partitions: i32 },
    PartitionsIncreased { from: i32, to: i32 },
    /// Shrinking is impossible in place, so the topic was deleted and
    /// created again. Its data is gone.
    Recreated { from: i32, to: i32 },
}

impl TopicUpdate {
    pub fn is_data_losing(&self) -> bool {
        matches!(self, TopicUpdate::Recreated { .. })
    }
}

/// Row of a topic listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicSummary {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i16,
}

pub struct TopicManager {
    cache: Arc<ConnectionCache>,
    lock: Mutex<()>,
    operation_timeout: Duration,
}

impl TopicManager {
    pub fn new(cache: Arc<ConnectionCache>, operation_timeout: Duration) -> Self {
        Self {
            cache,
            lock: Mutex::new(()),
            operation_timeout,
        }
    }

    /// # Errors
    ///
    /// `Conflict` if the topic exists, `Invalid` if the broker rejects the
    /// shape, `Timeout` past the operation bound, `Unreachable` otherwise.
    #[instrument(skip(self, request, target), fields(topic = request.name(), cluster = target.cluster()))]
    pub async fn create_topic(&self, request: &TopicRequest, target: &ClusterTarget) -> Result<()> {
        let _guard = self.lock.lock().await;
        let client = self.cache.get_connection(target).await?;
        self.create_with(&client, request).await
    }

    /// Move the topic to the requested partition count.
    ///
    /// Growing adds partitions in place. Shrinking deletes the topic and
    /// creates it again with the requested shape, which loses its data; the
    /// returned [`TopicUpdate::Recreated`] says so.
    ///
    /// # Errors
    ///
    /// `NotFound` if the topic does not exist; otherwise as for create.
    #[instrument(skip(self, request, target), fields(topic = request.name(), cluster = target.cluster()))]
    pub async fn update_topic(&self, request: &TopicRequest, target: &ClusterTarget) -> Result<TopicUpdate> {
        let _guard = self.lock.lock().await;
        let client = self.cache.get_connection(target).await?;

        let current = self
            .bounded("describe topic", client.describe_topic(request.name()))
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("topic '{}' does not exist", request.name())))?;

        let from = current.partitions;
        let to = request.partitions();
        if to < from {
            warn!(from, to, "shrinking partitions, recreating topic");
            self.delete_with(&client, request.name()).await?;
            self.create_with(&client, request).await?;
            Ok(TopicUpdate::Recreated { from, to })
        } else if to == from {
            Ok(TopicUpdate::Unchanged { partitions: from })
        } else {
            self.bounded("create partitions", client.create_partitions(request.name(), to))
                .await?;
            info!(from, to, "partitions increased");
            Ok(TopicUpdate::PartitionsIncreased { from, to })
        }
    }

    /// # Errors
    ///
    /// `NotFound` if the topic does not exist, `Timeout` or `Unreachable`
    /// on cluster failure.
    #[instrument(skip(self, target), fields(cluster = target.cluster()))]
    pub async fn delete_topic(&self, name: &str, target: &ClusterTarget) -> Result<()> {
        validate_topic_name(name)?;
        let _guard = self.lock.lock().await;
        let client = self.cache.get_connection(target).await?;
        self.delete_with(&client, name).await
    }

    /// Topics sorted by name, without the schema registry's topics.
    pub async fn list_topics(&self, target: &ClusterTarget) -> Result<Vec<TopicSummary>> {
        let client = self.cache.get_connection(target).await?;
        let mut topics: Vec<TopicSummary> = self
            .bounded("describe topics", client.describe_topics())
            .await?
            .into_iter()
            .filter(|t| !t.internal && t.name != SCHEMAS_TOPIC && !t.name.starts_with(CONFLUENT_PREFIX))
            .map(|t| TopicSummary {
                name: t.name,
                partitions: t.partitions,
                replication_factor: t.replication_factor,
            })
            .collect();
        topics.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(topics)
    }

    async fn create_with(&self, client: &AdminHandle, request: &TopicRequest) -> Result<()> {
        self.bounded("create topic", client.create_topic(&request.to_new_topic()))
            .await?;
        info!(
            topic = request.name(),
            partitions = request.partitions(),
            replication_factor = request.replication_factor(),
            "topic created"
        );
        Ok(())
    }

    async fn delete_with(&self, client: &AdminHandle, name: &str) -> Result<()> {
        self.bounded("delete topic", client.delete_topic(name)).await?;
        info!(topic = name, "topic deleted");
        Ok(())
    }

    async fn bounded<T>(&self, what: &str, call: impl Future<Output = AdminResult<T>>) -> Result<T> {
        match timeout(self.operation_timeout, call).await {
            Ok(result) => result.map_err(GatewayError::from),
            Err(_) => Err(GatewayError::timeout(format!(
                "{what} not acknowledged within {}ms",
                self.operation_timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_topic_name_rules() {
        assert!(validate_topic_name("orders.v1_eu-west").is_ok());
        assert!(validate_topic_name(&"a".repeat(MAX_TOPIC_NAME_LEN)).is_ok());

        for bad in ["", ".", "..", "has space", "slash/topic", "ümlaut"] {
            assert_eq!(validate_topic_name(bad).unwrap_err().kind(), ErrorKind::Invalid, "{bad}");
        }
        assert!(validate_topic_name(&"a".repeat(MAX_TOPIC_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_topic_request_validation() {
        assert!(TopicRequest::new("orders", 3, 1).is_ok());
        assert_eq!(TopicRequest::new("orders", 0, 1).unwrap_err().kind(), ErrorKind::Invalid);
        assert_eq!(TopicRequest::new("orders", 3, -1).unwrap_err().kind(), ErrorKind::Invalid);
        assert_eq!(TopicRequest::new("or ders", 3, 1).unwrap_err().kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_update_flags_data_loss() {
        assert!(TopicUpdate::Recreated { from: 6, to: 3 }.is_data_losing());
        assert!(!TopicUpdate::PartitionsIncreased { from: 3, to: 6 }.is_data_losing());
        assert!(!TopicUpdate::Unchanged { partitions: 3 }.is_data_losing());
    }
}
