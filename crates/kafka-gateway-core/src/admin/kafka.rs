//! Native Kafka admin client.
//!
//! Reads (metadata, ACL describe) and ACL mutations go to the bootstrap
//! connection. Topic mutations go to the controller named in metadata; a
//! NOT_CONTROLLER reply drops that connection and retries once against the
//! refreshed controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kafka_protocol::messages::create_acls_request::AclCreation;
use kafka_protocol::messages::create_partitions_request::CreatePartitionsTopic;
use kafka_protocol::messages::create_topics_request::CreatableTopic;
use kafka_protocol::messages::delete_acls_request::DeleteAclsFilter;
use kafka_protocol::messages::metadata_request::MetadataRequestTopic;
use kafka_protocol::messages::{
    CreateAclsRequest, CreatePartitionsRequest, CreateTopicsRequest, DeleteAclsRequest,
    DeleteTopicsRequest, DescribeAclsRequest, MetadataRequest, MetadataResponse, TopicName,
};
use kafka_protocol::protocol::{Request, StrBytes};
use tracing::{debug, info, warn};

use crate::acl::{
    AclBindingFilter, AclBindingSpec, AclOperation, AclPermission, PatternKind, ResourceKind,
    ANY_CODE,
};
use crate::broker::{BrokerConnection, BrokerPool, ConnectionSettings};
use crate::error::{codes, AdminError, AdminResult};
use crate::security::SecurityProfile;

use super::{AdminClient, AdminClientFactory, AdminHandle, NewTopic, TopicDescription};

const METADATA_VERSION: i16 = 5;
const CREATE_TOPICS_VERSION: i16 = 2;
const DELETE_TOPICS_VERSION: i16 = 1;
const CREATE_PARTITIONS_VERSION: i16 = 1;
const ACL_VERSION: i16 = 1;

/// Admin client speaking the Kafka wire protocol over a [`BrokerPool`].
pub struct KafkaAdminClient {
    pool: BrokerPool,
    /// Server-side timeout sent with topic mutations.
    broker_timeout: Duration,
    closed: AtomicBool,
}

impl KafkaAdminClient {
    #[must_use]
    pub fn new(pool: BrokerPool, broker_timeout: Duration) -> Self {
        Self {
            pool,
            broker_timeout,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> AdminResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AdminError::Closed);
        }
        Ok(())
    }

    fn timeout_ms(&self) -> i32 {
        i32::try_from(self.broker_timeout.as_millis()).unwrap_or(i32::MAX)
    }

    async fn metadata(&self, topics: Option<&[&str]>) -> AdminResult<MetadataResponse> {
        self.ensure_open()?;
        let request = MetadataRequest::default()
            .with_topics(topics.map(|names| {
                names
                    .iter()
                    .map(|name| MetadataRequestTopic::default().with_name(Some(topic_name(name))))
                    .collect()
            }))
            .with_allow_auto_topic_creation(false);
        let conn = self.pool.bootstrap().await?;
        conn.call(&request, METADATA_VERSION).await
    }

    /// Connection to the current controller, falling back to bootstrap when
    /// the controller is unknown or not listed among the brokers.
    async fn controller(&self) -> AdminResult<(Option<i32>, Arc<BrokerConnection>)> {
        let metadata = self.metadata(Some(&[])).await?;
        let controller_id = metadata.controller_id.0;
        let broker = metadata.brokers.iter().find(|b| b.node_id.0 == controller_id);

        match broker {
            Some(broker) if controller_id >= 0 => {
                let address = format!("{}:{}", broker.host.as_str(), broker.port);
                let conn = self.pool.broker(controller_id, &address).await?;
                Ok((Some(controller_id), conn))
            }
            _ => {
                debug!(controller_id, "controller not advertised, using bootstrap connection");
                Ok((None, self.pool.bootstrap().await?))
            }
        }
    }

    async fn call_controller<R, F>(&self, request: &R, version: i16, stale: F) -> AdminResult<R::Response>
    where
        R: Request + Sync,
        R::Response: Send,
        F: Fn(&R::Response) -> bool + Send + Sync,
    {
        let mut retried = false;
        loop {
            let (controller_id, conn) = self.controller().await?;
            let result = conn.call(request, version).await;
            let forget = match &result {
                Ok(response) => stale(response) && !retried,
                Err(_) => true,
            };
            if forget {
                if let Some(id) = controller_id {
                    self.pool.forget(id).await;
                }
            }
            match result {
                Ok(_) if forget => {
                    info!(api_key = R::KEY, "controller moved, retrying");
                    retried = true;
                }
                other => return other,
            }
        }
    }

    async fn any_broker(&self) -> AdminResult<Arc<BrokerConnection>> {
        self.ensure_open()?;
        self.pool.bootstrap().await
    }
}

#[async_trait]
impl AdminClient for KafkaAdminClient {
    /// Metadata for no topics: broker list and controller only.
    async fn probe(&self) -> AdminResult<()> {
        self.metadata(Some(&[])).await.map(|_| ())
    }

    async fn list_topics(&self) -> AdminResult<Vec<String>> {
        let metadata = self.metadata(None).await?;
        Ok(metadata
            .topics
            .iter()
            .filter(|t| t.error_code == codes::NONE && !t.is_internal)
            .filter_map(|t| t.name.as_ref().map(|n| n.as_str().to_string()))
            .collect())
    }

    async fn describe_topics(&self) -> AdminResult<Vec<TopicDescription>> {
        let metadata = self.metadata(None).await?;
        Ok(describe(&metadata))
    }

    async fn describe_topic(&self, name: &str) -> AdminResult<Option<TopicDescription>> {
        let metadata = self.metadata(Some(&[name])).await?;
        let Some(topic) = metadata
            .topics
            .iter()
            .find(|t| t.name.as_ref().is_some_and(|n| n.as_str() == name))
        else {
            return Ok(None);
        };
        match topic.error_code {
            codes::NONE => Ok(describe(&metadata).into_iter().find(|d| d.name == name)),
            codes::UNKNOWN_TOPIC_OR_PARTITION => Ok(None),
            code => Err(AdminError::broker(code, None)),
        }
    }

    async fn create_topic(&self, topic: &NewTopic) -> AdminResult<()> {
        self.ensure_open()?;
        let request = CreateTopicsRequest::default()
            .with_topics(vec![CreatableTopic::default()
                .with_name(topic_name(&topic.name))
                .with_num_partitions(topic.partitions)
                .with_replication_factor(topic.replication_factor)])
            .with_timeout_ms(self.timeout_ms())
            .with_validate_only(false);

        let response = self
            .call_controller(&request, CREATE_TOPICS_VERSION, |r| {
                r.topics.iter().any(|t| t.error_code == codes::NOT_CONTROLLER)
            })
            .await?;

        for result in &response.topics {
            if result.error_code != codes::NONE {
                return Err(AdminError::broker(result.error_code, message(&result.error_message)));
            }
        }
        info!(topic = %topic.name, partitions = topic.partitions, "topic created");
        Ok(())
    }

    async fn create_partitions(&self, name: &str, total_count: i32) -> AdminResult<()> {
        self.ensure_open()?;
        let request = CreatePartitionsRequest::default()
            .with_topics(vec![CreatePartitionsTopic::default()
                .with_name(topic_name(name))
                .with_count(total_count)
                .with_assignments(None)])
            .with_timeout_ms(self.timeout_ms())
            .with_validate_only(false);

        let response = self
            .call_controller(&request, CREATE_PARTITIONS_VERSION, |r| {
                r.results.iter().any(|t| t.error_code == codes::NOT_CONTROLLER)
            })
            .await?;

        for result in &response.results {
            if result.error_code != codes::NONE {
                return Err(AdminError::broker(result.error_code, message(&result.error_message)));
            }
        }
        info!(topic = name, total_count, "partitions added");
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> AdminResult<()> {
        self.ensure_open()?;
        let request = DeleteTopicsRequest::default()
            .with_topic_names(vec![topic_name(name)])
            .with_timeout_ms(self.timeout_ms());

        let response = self
            .call_controller(&request, DELETE_TOPICS_VERSION, |r| {
                r.responses.iter().any(|t| t.error_code == codes::NOT_CONTROLLER)
            })
            .await?;

        for result in &response.responses {
            if result.error_code != codes::NONE {
                return Err(AdminError::broker(result.error_code, None));
            }
        }
        info!(topic = name, "topic deleted");
        Ok(())
    }

    async fn describe_acls(&self, filter: &AclBindingFilter) -> AdminResult<Vec<AclBindingSpec>> {
        let request = DescribeAclsRequest::default()
            .with_resource_type_filter(filter.resource_kind.map_or(ANY_CODE, ResourceKind::code))
            .with_resource_name_filter(filter.resource_name.as_deref().map(str_bytes))
            .with_pattern_type_filter(filter.pattern_kind.map_or(ANY_CODE, PatternKind::code))
            .with_principal_filter(filter.principal.as_deref().map(str_bytes))
            .with_host_filter(filter.host.as_deref().map(str_bytes))
            .with_operation(filter.operation.map_or(ANY_CODE, AclOperation::code))
            .with_permission_type(filter.permission.map_or(ANY_CODE, AclPermission::code));

        let response = self.any_broker().await?.call(&request, ACL_VERSION).await?;
        if response.error_code != codes::NONE {
            return Err(AdminError::broker(response.error_code, message(&response.error_message)));
        }

        let mut bindings = Vec::new();
        for resource in &response.resources {
            for acl in &resource.acls {
                let spec = binding_from_wire(
                    resource.resource_type,
                    resource.resource_name.as_str(),
                    resource.pattern_type,
                    acl.principal.as_str(),
                    acl.host.as_str(),
                    acl.operation,
                    acl.permission_type,
                );
                match spec {
                    Some(spec) => bindings.push(spec),
                    None => debug!(
                        resource_type = resource.resource_type,
                        operation = acl.operation,
                        "skipping ACL with unrecognised codes"
                    ),
                }
            }
        }
        Ok(bindings)
    }

    async fn create_acls(&self, bindings: &[AclBindingSpec]) -> AdminResult<()> {
        if bindings.is_empty() {
            return Ok(());
        }
        let creations = bindings
            .iter()
            .map(|b| {
                AclCreation::default()
                    .with_resource_type(b.resource_kind.code())
                    .with_resource_name(str_bytes(&b.resource_name))
                    .with_resource_pattern_type(b.pattern_kind.code())
                    .with_principal(str_bytes(&b.principal))
                    .with_host(str_bytes(&b.host))
                    .with_operation(b.operation.code())
                    .with_permission_type(b.permission.code())
            })
            .collect();
        let request = CreateAclsRequest::default().with_creations(creations);

        let response = self.any_broker().await?.call(&request, ACL_VERSION).await?;
        let failed: Vec<_> = response
            .results
            .iter()
            .filter(|r| r.error_code != codes::NONE)
            .collect();
        if let Some(first) = failed.first() {
            warn!(failed = failed.len(), total = bindings.len(), "ACL creation rejected");
            return Err(AdminError::Broker {
                code: first.error_code,
                message: format!(
                    "{} of {} ACL creations failed: {}",
                    failed.len(),
                    bindings.len(),
                    message(&first.error_message).unwrap_or("no error message")
                ),
            });
        }
        Ok(())
    }

    async fn delete_acls(&self, filters: &[AclBindingFilter]) -> AdminResult<Vec<AclBindingSpec>> {
        if filters.is_empty() {
            return Ok(Vec::new());
        }
        let wire_filters = filters
            .iter()
            .map(|f| {
                DeleteAclsFilter::default()
                    .with_resource_type_filter(f.resource_kind.map_or(ANY_CODE, ResourceKind::code))
                    .with_resource_name_filter(f.resource_name.as_deref().map(str_bytes))
                    .with_pattern_type_filter(f.pattern_kind.map_or(ANY_CODE, PatternKind::code))
                    .with_principal_filter(f.principal.as_deref().map(str_bytes))
                    .with_host_filter(f.host.as_deref().map(str_bytes))
                    .with_operation(f.operation.map_or(ANY_CODE, AclOperation::code))
                    .with_permission_type(f.permission.map_or(ANY_CODE, AclPermission::code))
            })
            .collect();
        let request = DeleteAclsRequest::default().with_filters(wire_filters);

        let response = self.any_broker().await?.call(&request, ACL_VERSION).await?;
        let mut deleted = Vec::new();
        for result in &response.filter_results {
            if result.error_code != codes::NONE {
                return Err(AdminError::broker(result.error_code, message(&result.error_message)));
            }
            deleted.extend(result.matching_acls.iter().filter(|m| m.error_code == codes::NONE).filter_map(
                |m| {
                    binding_from_wire(
                        m.resource_type,
                        m.resource_name.as_str(),
                        m.pattern_type,
                        m.principal.as_str(),
                        m.host.as_str(),
                        m.operation,
                        m.permission_type,
                    )
                },
            ));
        }
        Ok(deleted)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.pool.close().await;
            debug!("admin client closed");
        }
    }
}

/// Builds [`KafkaAdminClient`]s. No I/O happens until the first call.
#[derive(Debug, Clone, Copy, Default)]
pub struct KafkaAdminFactory;

#[async_trait]
impl AdminClientFactory for KafkaAdminFactory {
    async fn create(&self, bootstrap: &[String], profile: &SecurityProfile) -> AdminResult<AdminHandle> {
        let settings = ConnectionSettings::from_profile(profile)?;
        let tuning = profile.tuning();
        let pool = BrokerPool::new(
            bootstrap.to_vec(),
            Arc::new(settings),
            tuning.retries,
            tuning.retry_backoff,
        );
        debug!(protocol = %profile.protocol(), hosts = bootstrap.len(), "admin client created");
        Ok(Arc::new(KafkaAdminClient::new(pool, tuning.request_timeout)))
    }
}

fn str_bytes(s: &str) -> StrBytes {
    StrBytes::from_string(s.to_string())
}

fn message(text: &Option<StrBytes>) -> Option<&str> {
    text.as_ref().map(|m| m.as_str())
}

fn topic_name(s: &str) -> TopicName {
    TopicName::from(str_bytes(s))
}

fn describe(metadata: &MetadataResponse) -> Vec<TopicDescription> {
    metadata
        .topics
        .iter()
        .filter(|t| t.error_code == codes::NONE)
        .filter_map(|t| {
            let name = t.name.as_ref()?.as_str().to_string();
            let replication_factor = t
                .partitions
                .iter()
                .min_by_key(|p| p.partition_index)
                .map_or(0, |p| i16::try_from(p.replica_nodes.len()).unwrap_or(i16::MAX));
            Some(TopicDescription {
                name,
                partitions: i32::try_from(t.partitions.len()).unwrap_or(i32::MAX),
                replication_factor,
                internal: t.is_internal,
            })
        })
        .collect()
}

fn binding_from_wire(
    resource_type: i8,
    resource_name: &str,
    pattern_type: i8,
    principal: &str,
    host: &str,
    operation: i8,
    permission: i8,
) -> Option<AclBindingSpec> {
    Some(AclBindingSpec {
        resource_kind: ResourceKind::from_code(resource_type)?,
        resource_name: resource_name.to_string(),
        pattern_kind: PatternKind::from_code(pattern_type)?,
        principal: principal.to_string(),
        host: host.to_string(),
        operation: AclOperation::from_code(operation)?,
        permission: AclPermission::from_code(permission)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kafka_protocol::messages::metadata_response::{
        MetadataResponsePartition, MetadataResponseTopic,
    };
    use kafka_protocol::messages::BrokerId;

    fn topic(name: &str, partitions: i32, replicas: usize, internal: bool) -> MetadataResponseTopic {
        MetadataResponseTopic::default()
            .with_name(Some(topic_name(name)))
            .with_is_internal(internal)
            .with_partitions(
                (0..partitions)
                    .map(|i| {
                        MetadataResponsePartition::default()
                            .with_partition_index(i)
                            .with_replica_nodes((0..replicas as i32).map(BrokerId).collect())
                    })
                    .collect(),
            )
    }

    #[test]
    fn test_describe_counts_partitions_and_replicas() {
        let metadata = MetadataResponse::default().with_topics(vec![
            topic("orders", 6, 3, false),
            topic("__consumer_offsets", 50, 1, true),
            MetadataResponseTopic::default()
                .with_name(Some(topic_name("broken")))
                .with_error_code(codes::UNKNOWN_TOPIC_OR_PARTITION),
        ]);
        let described = describe(&metadata);
        assert_eq!(described.len(), 2);
        assert_eq!(
            described[0],
            TopicDescription {
                name: "orders".to_string(),
                partitions: 6,
                replication_factor: 3,
                internal: false,
            }
        );
        assert!(described[1].internal);
    }

    #[test]
    fn test_binding_from_wire_rejects_unknown_codes() {
        assert!(binding_from_wire(2, "t", 3, "User:a", "*", 4, 3).is_some());
        // DELEGATION_TOKEN resource type.
        assert!(binding_from_wire(6, "t", 3, "User:a", "*", 4, 3).is_none());
        assert!(binding_from_wire(2, "t", 2, "User:a", "*", 4, 3).is_none());
    }

    #[tokio::test]
    async fn test_closed_client_rejects_calls() {
        let settings = ConnectionSettings::plaintext(
            "test",
            Duration::from_millis(50),
            Duration::from_millis(50),
        );
        let pool = BrokerPool::new(vec![], Arc::new(settings), 0, Duration::ZERO);
        let client = KafkaAdminClient::new(pool, Duration::from_secs(1));
        client.close().await;
        assert!(matches!(client.list_topics().await, Err(AdminError::Closed)));
        assert!(matches!(
            client.describe_acls(&AclBindingFilter::any()).await,
            Err(AdminError::Closed)
        ));
    }
}
