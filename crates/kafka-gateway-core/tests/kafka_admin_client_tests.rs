//! Wire-level tests for the native admin client against a mock broker.
//!
//! The mock broker answers each API key with a canned response and records
//! the decoded requests, so both directions of the codec are checked.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kafka_gateway_core::acl::{
    AclBindingFilter, AclBindingSpec, AclOperation, AclPermission, PatternKind, ResourceKind,
};
use kafka_gateway_core::admin::{AdminClient, KafkaAdminClient, NewTopic};
use kafka_gateway_core::broker::{BrokerPool, ConnectionSettings};
use kafka_gateway_core::error::{codes, AdminError};
use kafka_gateway_core::testing::{api_keys, fast_config, responses, BrokerCall, MockBroker};
use kafka_gateway_core::{ClusterTarget, ErrorKind, Gateway, GatewayError, SecurityProtocol, TopicRequest};
use kafka_protocol::messages::create_acls_response::AclCreationResult;
use kafka_protocol::messages::create_partitions_response::CreatePartitionsTopicResult;
use kafka_protocol::messages::create_topics_response::CreatableTopicResult;
use kafka_protocol::messages::delete_acls_response::{DeleteAclsFilterResult, DeleteAclsMatchingAcl};
use kafka_protocol::messages::delete_topics_response::DeletableTopicResult;
use kafka_protocol::messages::describe_acls_response::{AclDescription, DescribeAclsResource};
use kafka_protocol::messages::{
    CreateAclsRequest, CreateAclsResponse, CreatePartitionsRequest, CreatePartitionsResponse,
    CreateTopicsRequest, CreateTopicsResponse, DeleteAclsRequest, DeleteAclsResponse,
    DeleteTopicsRequest, DeleteTopicsResponse, DescribeAclsRequest, DescribeAclsResponse,
    MetadataRequest,
};
use kafka_protocol::protocol::StrBytes;

async fn start_broker(topics: &[(&str, i32, i32)]) -> MockBroker {
    let mut broker = MockBroker::new("127.0.0.1:0");
    let address = broker.start().await.unwrap();
    broker
        .register_handler(api_keys::METADATA, responses::fixed(responses::metadata(&address, topics)))
        .await;
    broker
}

fn client_for(broker: &MockBroker) -> KafkaAdminClient {
    let settings = ConnectionSettings::plaintext(
        "kafka-gateway-test",
        Duration::from_secs(1),
        Duration::from_millis(500),
    );
    let pool = BrokerPool::new(
        vec![broker.address().to_string()],
        Arc::new(settings),
        0,
        Duration::from_millis(10),
    );
    KafkaAdminClient::new(pool, Duration::from_secs(5))
}

fn s(value: &str) -> StrBytes {
    StrBytes::from_string(value.to_string())
}

fn svc_a_write() -> AclBindingSpec {
    AclBindingSpec::allow(
        ResourceKind::Topic,
        "orders",
        PatternKind::Literal,
        "User:svc-a",
        "*",
        AclOperation::Write,
    )
}

/// Test that listing hides internal topics.
#[tokio::test]
async fn test_list_topics() {
    let mut broker = start_broker(&[("orders", 3, 1), ("__consumer_offsets", 50, 1)]).await;
    let client = client_for(&broker);

    let topics = client.list_topics().await.unwrap();
    assert_eq!(topics, vec!["orders".to_string()]);

    broker.stop().await;
}

/// Test that the liveness check asks for no topics, while listing asks for all.
#[tokio::test]
async fn test_probe_requests_no_topics() {
    let mut broker = start_broker(&[("orders", 3, 1)]).await;
    let client = client_for(&broker);

    client.probe().await.unwrap();
    client.list_topics().await.unwrap();

    let calls = broker.get_calls_for_api(api_keys::METADATA).await;
    assert_eq!(calls.len(), 2);
    let probe: MetadataRequest = calls[0].decode().unwrap();
    assert_eq!(probe.topics.map(|t| t.len()), Some(0));
    let listing: MetadataRequest = calls[1].decode().unwrap();
    assert!(listing.topics.is_none());

    broker.stop().await;
}

/// Test that describe reports partitions and replication factor.
#[tokio::test]
async fn test_describe_topic() {
    let mut broker = start_broker(&[("orders", 3, 2)]).await;
    let client = client_for(&broker);

    let topic = client.describe_topic("orders").await.unwrap().unwrap();
    assert_eq!(topic.partitions, 3);
    assert_eq!(topic.replication_factor, 2);
    assert!(!topic.internal);

    assert!(client.describe_topic("ghost").await.unwrap().is_none());

    broker.stop().await;
}

/// Test that create sends the requested shape to the controller.
#[tokio::test]
async fn test_create_topic_request() {
    let mut broker = start_broker(&[]).await;
    broker
        .register_handler(
            api_keys::CREATE_TOPICS,
            responses::fixed(
                CreateTopicsResponse::default()
                    .with_topics(vec![CreatableTopicResult::default().with_error_code(codes::NONE)]),
            ),
        )
        .await;
    let client = client_for(&broker);

    client
        .create_topic(&NewTopic {
            name: "orders".to_string(),
            partitions: 6,
            replication_factor: 1,
        })
        .await
        .unwrap();

    let calls = broker.get_calls_for_api(api_keys::CREATE_TOPICS).await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].api_version, 2);
    let request: CreateTopicsRequest = calls[0].decode().unwrap();
    assert_eq!(request.topics.len(), 1);
    assert_eq!(request.topics[0].name.as_str(), "orders");
    assert_eq!(request.topics[0].num_partitions, 6);
    assert_eq!(request.topics[0].replication_factor, 1);
    assert!(!request.validate_only);

    broker.stop().await;
}

/// Test that a topic-level error code becomes a broker error.
#[tokio::test]
async fn test_create_topic_already_exists() {
    let mut broker = start_broker(&[("orders", 3, 1)]).await;
    broker
        .register_handler(
            api_keys::CREATE_TOPICS,
            responses::fixed(CreateTopicsResponse::default().with_topics(vec![
                CreatableTopicResult::default()
                    .with_error_code(codes::TOPIC_ALREADY_EXISTS)
                    .with_error_message(Some(s("Topic 'orders' already exists."))),
            ])),
        )
        .await;
    let client = client_for(&broker);

    let err = client
        .create_topic(&NewTopic {
            name: "orders".to_string(),
            partitions: 3,
            replication_factor: 1,
        })
        .await
        .unwrap_err();
    assert_eq!(err.broker_code(), Some(codes::TOPIC_ALREADY_EXISTS));
    assert_eq!(GatewayError::from(err).kind(), ErrorKind::Conflict);

    broker.stop().await;
}

/// Test that a NOT_CONTROLLER reply is retried once.
#[tokio::test]
async fn test_not_controller_is_retried() {
    let mut broker = start_broker(&[]).await;
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    broker
        .register_handler(
            api_keys::CREATE_TOPICS,
            Arc::new(move |call: &BrokerCall| {
                let code = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    codes::NOT_CONTROLLER
                } else {
                    codes::NONE
                };
                responses::encode(
                    call,
                    &CreateTopicsResponse::default()
                        .with_topics(vec![CreatableTopicResult::default().with_error_code(code)]),
                )
            }),
        )
        .await;
    let client = client_for(&broker);

    client
        .create_topic(&NewTopic {
            name: "orders".to_string(),
            partitions: 1,
            replication_factor: 1,
        })
        .await
        .unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    broker.stop().await;
}

/// Test that partitions are requested as a new total.
#[tokio::test]
async fn test_create_partitions_request() {
    let mut broker = start_broker(&[("orders", 3, 1)]).await;
    broker
        .register_handler(
            api_keys::CREATE_PARTITIONS,
            responses::fixed(
                CreatePartitionsResponse::default()
                    .with_results(vec![CreatePartitionsTopicResult::default().with_error_code(codes::NONE)]),
            ),
        )
        .await;
    let client = client_for(&broker);

    client.create_partitions("orders", 8).await.unwrap();

    let calls = broker.get_calls_for_api(api_keys::CREATE_PARTITIONS).await;
    let request: CreatePartitionsRequest = calls[0].decode().unwrap();
    assert_eq!(request.topics[0].name.as_str(), "orders");
    assert_eq!(request.topics[0].count, 8);

    broker.stop().await;
}

/// Test that deleting a missing topic surfaces as not found.
#[tokio::test]
async fn test_delete_missing_topic() {
    let mut broker = start_broker(&[]).await;
    broker
        .register_handler(
            api_keys::DELETE_TOPICS,
            responses::fixed(DeleteTopicsResponse::default().with_responses(vec![
                DeletableTopicResult::default().with_error_code(codes::UNKNOWN_TOPIC_OR_PARTITION),
            ])),
        )
        .await;
    let client = client_for(&broker);

    let err = client.delete_topic("ghost").await.unwrap_err();
    assert_eq!(GatewayError::from(err).kind(), ErrorKind::NotFound);

    let calls = broker.get_calls_for_api(api_keys::DELETE_TOPICS).await;
    let request: DeleteTopicsRequest = calls[0].decode().unwrap();
    assert_eq!(request.topic_names.len(), 1);
    assert_eq!(request.topic_names[0].as_str(), "ghost");

    broker.stop().await;
}

/// Test that ACL descriptions decode into bindings and filters encode exactly.
#[tokio::test]
async fn test_describe_acls() {
    let mut broker = start_broker(&[]).await;
    broker
        .register_handler(
            api_keys::DESCRIBE_ACLS,
            responses::fixed(
                DescribeAclsResponse::default()
                    .with_error_code(codes::NONE)
                    .with_resources(vec![DescribeAclsResource::default()
                        .with_resource_type(ResourceKind::Topic.code())
                        .with_resource_name(s("orders"))
                        .with_pattern_type(PatternKind::Literal.code())
                        .with_acls(vec![AclDescription::default()
                            .with_principal(s("User:svc-a"))
                            .with_host(s("*"))
                            .with_operation(AclOperation::Write.code())
                            .with_permission_type(AclPermission::Allow.code())])]),
            ),
        )
        .await;
    let client = client_for(&broker);

    let found = client
        .describe_acls(&AclBindingFilter::exact(&svc_a_write()))
        .await
        .unwrap();
    assert_eq!(found, vec![svc_a_write()]);

    let calls = broker.get_calls_for_api(api_keys::DESCRIBE_ACLS).await;
    assert_eq!(calls[0].api_version, 1);
    let request: DescribeAclsRequest = calls[0].decode().unwrap();
    assert_eq!(request.resource_type_filter, 2);
    assert_eq!(request.pattern_type_filter, 3);
    assert_eq!(request.operation, 4);
    assert_eq!(request.permission_type, 3);
    assert_eq!(request.resource_name_filter.as_ref().map(|n| n.as_str()), Some("orders"));
    assert_eq!(request.principal_filter.as_ref().map(|p| p.as_str()), Some("User:svc-a"));

    broker.stop().await;
}

/// Test that one rejected creation fails the batch with a count.
#[tokio::test]
async fn test_create_acls_partial_rejection() {
    let mut broker = start_broker(&[]).await;
    broker
        .register_handler(
            api_keys::CREATE_ACLS,
            responses::fixed(CreateAclsResponse::default().with_results(vec![
                AclCreationResult::default().with_error_code(codes::NONE),
                AclCreationResult::default()
                    .with_error_code(codes::CLUSTER_AUTHORIZATION_FAILED)
                    .with_error_message(Some(s("not authorized"))),
            ])),
        )
        .await;
    let client = client_for(&broker);
    let mut describe = svc_a_write();
    describe.operation = AclOperation::Describe;

    let err = client.create_acls(&[svc_a_write(), describe]).await.unwrap_err();
    assert_eq!(err.broker_code(), Some(codes::CLUSTER_AUTHORIZATION_FAILED));
    assert!(err.to_string().contains("1 of 2"), "{err}");

    let calls = broker.get_calls_for_api(api_keys::CREATE_ACLS).await;
    let request: CreateAclsRequest = calls[0].decode().unwrap();
    assert_eq!(request.creations.len(), 2);
    assert_eq!(request.creations[1].operation, AclOperation::Describe.code());

    broker.stop().await;
}

/// Test that deleted bindings are read from the matching ACLs.
#[tokio::test]
async fn test_delete_acls_returns_matches() {
    let mut broker = start_broker(&[]).await;
    broker
        .register_handler(
            api_keys::DELETE_ACLS,
            responses::fixed(DeleteAclsResponse::default().with_filter_results(vec![
                DeleteAclsFilterResult::default()
                    .with_error_code(codes::NONE)
                    .with_matching_acls(vec![DeleteAclsMatchingAcl::default()
                        .with_error_code(codes::NONE)
                        .with_resource_type(ResourceKind::Topic.code())
                        .with_resource_name(s("orders"))
                        .with_pattern_type(PatternKind::Literal.code())
                        .with_principal(s("User:svc-a"))
                        .with_host(s("*"))
                        .with_operation(AclOperation::Write.code())
                        .with_permission_type(AclPermission::Allow.code())]),
                DeleteAclsFilterResult::default().with_error_code(codes::NONE),
            ])),
        )
        .await;
    let client = client_for(&broker);
    let mut describe = svc_a_write();
    describe.operation = AclOperation::Describe;

    let deleted = client
        .delete_acls(&[
            AclBindingFilter::exact(&svc_a_write()),
            AclBindingFilter::exact(&describe),
        ])
        .await
        .unwrap();
    assert_eq!(deleted, vec![svc_a_write()]);

    let calls = broker.get_calls_for_api(api_keys::DELETE_ACLS).await;
    let request: DeleteAclsRequest = calls[0].decode().unwrap();
    assert_eq!(request.filters.len(), 2);

    broker.stop().await;
}

/// Test that an unanswered request times out.
#[tokio::test]
async fn test_unanswered_request_times_out() {
    let mut broker = MockBroker::new("127.0.0.1:0");
    broker.start().await.unwrap();
    let client = client_for(&broker);

    let err = client.list_topics().await.unwrap_err();
    assert!(matches!(err, AdminError::Timeout { .. }), "{err}");

    broker.stop().await;
}

/// Test that a closed client refuses further calls.
#[tokio::test]
async fn test_closed_client() {
    let mut broker = start_broker(&[("orders", 1, 1)]).await;
    let client = client_for(&broker);

    client.list_topics().await.unwrap();
    client.close().await;
    client.close().await;

    assert!(matches!(client.list_topics().await, Err(AdminError::Closed)));

    broker.stop().await;
}

/// Test a topic create through the gateway and the native client factory.
#[tokio::test]
async fn test_gateway_create_over_wire() {
    let mut broker = start_broker(&[]).await;
    broker
        .register_handler(
            api_keys::CREATE_TOPICS,
            responses::fixed(
                CreateTopicsResponse::default()
                    .with_topics(vec![CreatableTopicResult::default().with_error_code(codes::NONE)]),
            ),
        )
        .await;
    let gateway = Gateway::new(fast_config()).unwrap();
    let target = ClusterTarget::new(broker.address(), SecurityProtocol::Plaintext, "wire");

    gateway
        .topics()
        .create_topic(&TopicRequest::new("orders", 3, 1).unwrap(), &target)
        .await
        .unwrap();

    assert_eq!(broker.get_calls_for_api(api_keys::CREATE_TOPICS).await.len(), 1);
    assert!(!broker.get_calls_for_api(api_keys::METADATA).await.is_empty());

    gateway.shutdown().await;
    broker.stop().await;
}
