//! Test doubles for the gateway.
//!
//! - [`InMemoryCluster`] / [`MockAdminFactory`] - the admin seam backed by
//!   shared in-memory state with an ordered call log and failure injection
//! - [`GatewayHarness`] - a full [`Gateway`](crate::Gateway) over that cluster
//! - [`MockBroker`] - a TCP broker for wire-level tests of the native client
//!
//! # Example
//!
//! ```rust,ignore
//! use kafka_gateway_core::testing::GatewayHarness;
//! use kafka_gateway_core::topics::TopicRequest;
//!
//! #[tokio::test]
//! async fn creates_topic() {
//!     let harness = GatewayHarness::new();
//!     let request = TopicRequest::new("orders", 3, 1).unwrap();
//!     harness.gateway.topics().create_topic(&request, &harness.target()).await.unwrap();
//!     assert!(harness.cluster.topic("orders").await.is_some());
//! }
//! ```

pub mod cluster;
pub mod harness;
pub mod mock_broker;

pub use cluster::{AdminCall, InMemoryAdmin, InMemoryCluster, MockAdminFactory};
pub use harness::{fast_config, GatewayHarness, TEST_HOSTS};
pub use mock_broker::{api_keys, responses, BrokerCall, MockBroker, ResponseGenerator};
