//! Integration tests for cluster and REST service liveness.

use std::time::{Duration, Instant};

use kafka_gateway_core::testing::{fast_config, GatewayHarness};
use kafka_gateway_core::{ClusterKind, ClusterStatus, ClusterTarget, Gateway, SecurityProtocol};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Serve one canned HTTP response per connection and report request lines.
async fn http_stub(status_line: &'static str) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let text = String::from_utf8_lossy(&request).to_string();
                let _ = tx.send(text.lines().next().unwrap_or_default().to_string());

                let response = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n[]"
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (address, rx)
}

/// Test that a reachable cluster reports online.
#[tokio::test]
async fn test_kafka_online() {
    let harness = GatewayHarness::new();

    let status = harness.gateway.health().status("kafka", &harness.target()).await;
    assert_eq!(status, ClusterStatus::Online);
}

/// Test that a cluster whose probe fails reports offline.
#[tokio::test]
async fn test_kafka_offline_when_down() {
    let harness = GatewayHarness::new();
    harness.cluster.set_down(true);

    let status = harness.gateway.health().probe(ClusterKind::Kafka, &harness.target()).await;
    assert_eq!(status, ClusterStatus::Offline);
}

/// Test that a probe that never answers is offline within the bound.
#[tokio::test]
async fn test_kafka_offline_on_slow_probe() {
    let harness = GatewayHarness::new();
    harness
        .cluster
        .set_probe_delay(Some(Duration::from_secs(5)))
        .await;

    let started = Instant::now();
    let status = harness.gateway.health().status("kafka", &harness.target()).await;

    assert_eq!(status, ClusterStatus::Offline);
    assert!(started.elapsed() < Duration::from_secs(2));
}

/// Test that an unreachable address with the native client reports offline quickly.
#[tokio::test]
async fn test_unreachable_address_is_offline() {
    let gateway = Gateway::new(fast_config()).unwrap();
    let target = ClusterTarget::new("127.0.0.1:1", SecurityProtocol::Plaintext, "nowhere");

    let started = Instant::now();
    let status = gateway.health().status("kafka", &target).await;

    assert_eq!(status, ClusterStatus::Offline);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(gateway.cache().is_empty());
}

/// Test that unknown kinds report offline without probing.
#[tokio::test]
async fn test_unknown_kind_is_offline() {
    let harness = GatewayHarness::new();

    let status = harness.gateway.health().status("zookeeper", &harness.target()).await;
    assert_eq!(status, ClusterStatus::Offline);
    assert_eq!(harness.factory.created(), 0);
}

/// Test that a schema registry answering 200 on its subjects path is online.
#[tokio::test]
async fn test_schema_registry_online() {
    let (address, mut requests) = http_stub("200 OK").await;
    let harness = GatewayHarness::new();
    let target = ClusterTarget::new(&address, SecurityProtocol::Plaintext, "registry");

    let status = harness.gateway.health().status("schemaregistry", &target).await;

    assert_eq!(status, ClusterStatus::Online);
    let request_line = requests.recv().await.unwrap();
    assert!(request_line.starts_with("GET /subjects "), "{request_line}");
}

/// Test that a connect runtime is probed on its connectors path.
#[tokio::test]
async fn test_kafka_connect_online() {
    let (address, mut requests) = http_stub("200 OK").await;
    let harness = GatewayHarness::new();
    let target = ClusterTarget::new(&address, SecurityProtocol::Plaintext, "connect");

    let status = harness.gateway.health().probe(ClusterKind::KafkaConnect, &target).await;

    assert_eq!(status, ClusterStatus::Online);
    let request_line = requests.recv().await.unwrap();
    assert!(request_line.starts_with("GET /connectors "), "{request_line}");
}

/// Test that an error status reports offline.
#[tokio::test]
async fn test_rest_error_status_is_offline() {
    let (address, _requests) = http_stub("500 Internal Server Error").await;
    let harness = GatewayHarness::new();
    let target = ClusterTarget::new(&address, SecurityProtocol::Plaintext, "registry");

    let status = harness.gateway.health().status("schemaregistry", &target).await;
    assert_eq!(status, ClusterStatus::Offline);
}

/// Test that a refused REST connection reports offline.
#[tokio::test]
async fn test_rest_refused_is_offline() {
    let harness = GatewayHarness::new();
    let target = ClusterTarget::new("127.0.0.1:1", SecurityProtocol::Plaintext, "registry");

    let status = harness.gateway.health().status("kafkaconnect", &target).await;
    assert_eq!(status, ClusterStatus::Offline);
}
