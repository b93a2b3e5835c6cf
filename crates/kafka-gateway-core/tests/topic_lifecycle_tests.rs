//! Integration tests for topic create, resize, delete and listing.

use std::sync::Arc;
use std::time::Duration;

use kafka_gateway_core::testing::{AdminCall, GatewayHarness};
use kafka_gateway_core::{ErrorKind, TopicRequest, TopicUpdate};

/// Test that a topic can be created once and the second create conflicts.
#[tokio::test]
async fn test_create_then_conflict() {
    let harness = GatewayHarness::new();
    let request = TopicRequest::new("orders", 3, 1).unwrap();

    harness
        .gateway
        .topics()
        .create_topic(&request, &harness.target())
        .await
        .unwrap();

    let topic = harness.cluster.topic("orders").await.unwrap();
    assert_eq!(topic.partitions, 3);
    assert_eq!(topic.replication_factor, 1);

    let err = harness
        .gateway
        .topics()
        .create_topic(&request, &harness.target())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(harness.cluster.topic("orders").await.unwrap().partitions, 3);
}

/// Test that a replication factor above the broker count is invalid.
#[tokio::test]
async fn test_create_rejects_excess_replication() {
    let harness = GatewayHarness::new();
    let request = TopicRequest::new("orders", 3, 5).unwrap();

    let err = harness
        .gateway
        .topics()
        .create_topic(&request, &harness.target())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert!(harness.cluster.topic("orders").await.is_none());
}

/// Test that growing a topic adds partitions in place.
#[tokio::test]
async fn test_update_increases_partitions() {
    let harness = GatewayHarness::new();
    harness.cluster.seed_topic("orders", 3, 2).await;

    let update = harness
        .gateway
        .topics()
        .update_topic(&TopicRequest::new("orders", 6, 2).unwrap(), &harness.target())
        .await
        .unwrap();

    assert_eq!(update, TopicUpdate::PartitionsIncreased { from: 3, to: 6 });
    assert!(!update.is_data_losing());
    assert_eq!(harness.cluster.topic("orders").await.unwrap().partitions, 6);
    assert_eq!(
        harness.cluster.mutation_calls().await,
        vec![AdminCall::CreatePartitions("orders".to_string(), 6)]
    );
}

/// Test that shrinking a topic deletes it before creating it again.
#[tokio::test]
async fn test_update_shrink_recreates() {
    let harness = GatewayHarness::new();
    harness.cluster.seed_topic("orders", 6, 2).await;

    let update = harness
        .gateway
        .topics()
        .update_topic(&TopicRequest::new("orders", 2, 2).unwrap(), &harness.target())
        .await
        .unwrap();

    assert_eq!(update, TopicUpdate::Recreated { from: 6, to: 2 });
    assert!(update.is_data_losing());
    assert_eq!(harness.cluster.topic("orders").await.unwrap().partitions, 2);
    assert_eq!(
        harness.cluster.mutation_calls().await,
        vec![
            AdminCall::DeleteTopic("orders".to_string()),
            AdminCall::CreateTopic("orders".to_string()),
        ]
    );
}

/// Test that an update to the current count sends no mutation.
#[tokio::test]
async fn test_update_same_count_is_unchanged() {
    let harness = GatewayHarness::new();
    harness.cluster.seed_topic("orders", 4, 1).await;

    let update = harness
        .gateway
        .topics()
        .update_topic(&TopicRequest::new("orders", 4, 1).unwrap(), &harness.target())
        .await
        .unwrap();

    assert_eq!(update, TopicUpdate::Unchanged { partitions: 4 });
    assert!(harness.cluster.mutation_calls().await.is_empty());
}

/// Test that updating a missing topic is not found.
#[tokio::test]
async fn test_update_missing_topic() {
    let harness = GatewayHarness::new();

    let err = harness
        .gateway
        .topics()
        .update_topic(&TopicRequest::new("ghost", 4, 1).unwrap(), &harness.target())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

/// Test that deleting removes the topic and a second delete is not found.
#[tokio::test]
async fn test_delete_topic() {
    let harness = GatewayHarness::new();
    harness.cluster.seed_topic("orders", 3, 1).await;

    harness
        .gateway
        .topics()
        .delete_topic("orders", &harness.target())
        .await
        .unwrap();
    assert!(harness.cluster.topic("orders").await.is_none());

    let err = harness
        .gateway
        .topics()
        .delete_topic("orders", &harness.target())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

/// Test that an invalid name is rejected without contacting the cluster.
#[tokio::test]
async fn test_delete_invalid_name() {
    let harness = GatewayHarness::new();

    let err = harness
        .gateway
        .topics()
        .delete_topic("bad name", &harness.target())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert_eq!(harness.factory.created(), 0);
}

/// Test that a mutation the cluster never acknowledges times out.
#[tokio::test]
async fn test_create_times_out() {
    let harness = GatewayHarness::new();
    harness
        .cluster
        .set_mutation_delay(Some(Duration::from_secs(2)))
        .await;

    let started = std::time::Instant::now();
    let err = harness
        .gateway
        .topics()
        .create_topic(&TopicRequest::new("orders", 3, 1).unwrap(), &harness.target())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(2));
}

/// Test that listings hide internal and schema registry topics and are sorted.
#[tokio::test]
async fn test_list_topics_filters_and_sorts() {
    let harness = GatewayHarness::new();
    for (name, partitions) in [
        ("payments", 6),
        ("__consumer_offsets", 50),
        ("_schemas", 1),
        ("_confluent-metrics", 12),
        ("audit", 1),
    ] {
        harness.cluster.seed_topic(name, partitions, 1).await;
    }

    let topics = harness.gateway.topics().list_topics(&harness.target()).await.unwrap();

    let names: Vec<&str> = topics.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["audit", "payments"]);
    assert_eq!(topics[1].partitions, 6);
}

/// Test that concurrent mutations on one manager are serialized.
#[tokio::test]
async fn test_concurrent_creates_are_serialized() {
    let harness = Arc::new(GatewayHarness::new());

    let mut tasks = Vec::new();
    for i in 0..5 {
        let harness = Arc::clone(&harness);
        tasks.push(tokio::spawn(async move {
            let request = TopicRequest::new(format!("topic-{i}"), 1, 1).unwrap();
            harness
                .gateway
                .topics()
                .create_topic(&request, &harness.target())
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let topics = harness.gateway.topics().list_topics(&harness.target()).await.unwrap();
    assert_eq!(topics.len(), 5);
    assert_eq!(harness.factory.created(), 1);
}
