//! Integration tests for the admin connection cache.
//!
//! The mock factory counts the handles it creates and the in-memory cluster
//! counts the handles closed, so reuse and eviction are observable.

use std::sync::Arc;

use kafka_gateway_core::config::{CacheConfig, GatewayConfig};
use kafka_gateway_core::testing::{fast_config, GatewayHarness};
use kafka_gateway_core::{ClusterTarget, ErrorKind, Gateway, SecurityProtocol};

/// Test that repeated lookups for one target share a single handle.
#[tokio::test]
async fn test_reuses_live_handle() {
    let harness = GatewayHarness::new();
    let cache = harness.gateway.cache();

    let first = cache.get_connection(&harness.target()).await.unwrap();
    let second = cache.get_connection(&harness.target()).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(harness.factory.created(), 1);
    assert_eq!(cache.len(), 1);
}

/// Test that host order, duplicates and cluster case do not split the key.
#[tokio::test]
async fn test_equivalent_targets_share_handle() {
    let harness = GatewayHarness::new();
    let cache = harness.gateway.cache();
    let shuffled = ClusterTarget::new(
        "broker-2:9092, broker-1:9092,broker-2:9092",
        SecurityProtocol::Plaintext,
        "DEV",
    );

    let first = cache.get_connection(&harness.target()).await.unwrap();
    let second = cache.get_connection(&shuffled).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(harness.factory.created(), 1);
}

/// Test that a handle failing its probe is closed and replaced.
#[tokio::test]
async fn test_stale_handle_is_replaced() {
    let harness = GatewayHarness::new();
    let cache = harness.gateway.cache();

    let first = cache.get_connection(&harness.target()).await.unwrap();
    harness.cluster.fail_next_probes(1);
    let second = cache.get_connection(&harness.target()).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(harness.factory.created(), 2);
    assert_eq!(harness.cluster.close_count(), 1);
    assert_eq!(cache.len(), 1);
}

/// Test that a new handle failing its first probe is closed and not cached.
#[tokio::test]
async fn test_failed_first_probe_caches_nothing() {
    let harness = GatewayHarness::new();
    harness.cluster.fail_next_probes(1);

    let err = harness
        .gateway
        .cache()
        .get_connection(&harness.target())
        .await
        .err()
        .expect("lookup should fail");

    assert_eq!(err.kind(), ErrorKind::Unreachable);
    assert!(harness.gateway.cache().is_empty());
    assert_eq!(harness.cluster.close_count(), 1);

    harness.gateway.cache().get_connection(&harness.target()).await.unwrap();
    assert_eq!(harness.factory.created(), 2);
}

/// Test that a down cluster is unreachable.
#[tokio::test]
async fn test_down_cluster_is_unreachable() {
    let harness = GatewayHarness::new();
    harness.cluster.set_down(true);

    let err = harness
        .gateway
        .cache()
        .get_connection(&harness.target())
        .await
        .err()
        .expect("lookup should fail");
    assert_eq!(err.kind(), ErrorKind::Unreachable);
    assert!(harness.gateway.cache().is_empty());
}

/// Test that a profile the factory cannot use is a configuration error.
#[tokio::test]
async fn test_factory_failure_is_config_missing() {
    let harness = GatewayHarness::new();
    harness.factory.fail_create(true);

    let err = harness
        .gateway
        .cache()
        .get_connection(&harness.target())
        .await
        .err()
        .expect("lookup should fail");
    assert_eq!(err.kind(), ErrorKind::ConfigMissing);
    assert!(harness.gateway.cache().is_empty());
}

/// Test that a misspelled SASL mechanism in config is a configuration error.
#[tokio::test]
async fn test_unknown_mechanism_is_config_missing() {
    let mut config = fast_config();
    config.sasl.scram_mechanism = Some("FOO".to_string());
    let gateway = Gateway::new(config).unwrap();
    let target = ClusterTarget::new("127.0.0.1:1", SecurityProtocol::SaslSslScram, "prod");

    let err = gateway
        .cache()
        .get_connection(&target)
        .await
        .err()
        .expect("lookup should fail");
    assert_eq!(err.kind(), ErrorKind::ConfigMissing);
    assert!(err.message().contains("FOO"));
    assert!(gateway.cache().is_empty());
}

/// Test that protocols are keyed separately and each gets its own profile.
#[tokio::test]
async fn test_protocol_is_part_of_key() {
    let harness = GatewayHarness::new();
    let cache = harness.gateway.cache();
    let ssl = ClusterTarget::new(kafka_gateway_core::testing::TEST_HOSTS, SecurityProtocol::Ssl, "dev");

    let plain = cache.get_connection(&harness.target()).await.unwrap();
    let tls = cache.get_connection(&ssl).await.unwrap();

    assert!(!Arc::ptr_eq(&plain, &tls));
    assert_eq!(cache.len(), 2);
    assert_eq!(
        harness.factory.protocols().await,
        vec![SecurityProtocol::Plaintext, SecurityProtocol::Ssl]
    );
}

/// Test that the cache bound closes the oldest handle.
#[tokio::test]
async fn test_bound_evicts_oldest() {
    let config = GatewayConfig {
        cache: CacheConfig { max_entries: Some(1) },
        ..fast_config()
    };
    let harness = GatewayHarness::with_config(config);
    let cache = harness.gateway.cache();
    let staging = ClusterTarget::new("staging-1:9092", SecurityProtocol::Plaintext, "staging");

    cache.get_connection(&harness.target()).await.unwrap();
    cache.get_connection(&staging).await.unwrap();

    assert_eq!(cache.len(), 1);
    assert_eq!(harness.cluster.close_count(), 1);

    // The survivor is the newer handle.
    cache.get_connection(&staging).await.unwrap();
    assert_eq!(harness.factory.created(), 2);
}

/// Test that concurrent lookups for one key create one handle.
#[tokio::test]
async fn test_concurrent_lookups_create_once() {
    let harness = Arc::new(GatewayHarness::new());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let harness = Arc::clone(&harness);
        tasks.push(tokio::spawn(async move {
            harness.gateway.cache().get_connection(&harness.target()).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(harness.factory.created(), 1);
}

/// Test that evicting and shutting down close the handles.
#[tokio::test]
async fn test_evict_and_shutdown_close_handles() {
    let harness = GatewayHarness::new();
    let cache = harness.gateway.cache();
    let staging = ClusterTarget::new("staging-1:9092", SecurityProtocol::Plaintext, "staging");

    cache.get_connection(&harness.target()).await.unwrap();
    cache.get_connection(&staging).await.unwrap();

    cache.evict(&harness.target()).await;
    assert_eq!(cache.len(), 1);
    assert_eq!(harness.cluster.close_count(), 1);

    harness.gateway.shutdown().await;
    assert!(cache.is_empty());
    assert_eq!(harness.cluster.close_count(), 2);
}
