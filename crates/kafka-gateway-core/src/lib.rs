//! Kafka Cluster Gateway Core Library
//!
//! Administrative plumbing for a governance application that manages Kafka
//! clusters it does not own: authenticated admin connections under six
//! security protocols, cached and probed per cluster, plus topic lifecycle
//! and idempotent producer/consumer ACL grants on top of them.
//!
//! # Architecture
//!
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Error taxonomy and the lower-level error types
//! - [`security`] - Protocol names and per-connection security profiles
//! - [`tls`] / [`auth`] - rustls connector and SASL client mechanisms
//! - [`broker`] - Wire connections to individual brokers
//! - [`admin`] - The admin client seam and its native Kafka implementation
//! - [`cache`] - Process-wide cache of probed admin connections
//! - [`topics`] - Topic create, resize, delete and listing
//! - [`acl`] - Access requests and ACL reconciliation
//! - [`rest`] / [`health`] - Schema registry and connect endpoints, liveness
//! - [`gateway`] - Everything wired together from one configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use kafka_gateway_core::{ClusterTarget, Gateway, GatewayConfig, SecurityProtocol};
//! use kafka_gateway_core::topics::TopicRequest;
//!
//! let gateway = Gateway::new(GatewayConfig::from_file("gateway.yaml")?)?;
//! let target = ClusterTarget::new("kafka-1:9092,kafka-2:9092", SecurityProtocol::Plaintext, "dev");
//! gateway.topics().create_topic(&TopicRequest::new("orders", 6, 3)?, &target).await?;
//! ```

#![forbid(unsafe_code)]

pub mod acl;
pub mod admin;
pub mod auth;
pub mod broker;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod rest;
pub mod security;
pub mod tls;
pub mod topics;

/// Test doubles for integration testing.
///
/// Only available when compiling tests or with the `testing` feature.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use acl::{AccessRequest, AclBindingSpec, AclChange, AclReconciler, PatternKind, ReconcileOutcome};
pub use admin::{AdminClient, AdminClientFactory, AdminHandle, KafkaAdminFactory};
pub use cache::{ClusterTarget, ConnectionCache, ConnectionKey};
pub use config::GatewayConfig;
pub use error::{ErrorKind, GatewayError, Result};
pub use gateway::Gateway;
pub use health::{ClusterKind, ClusterStatus, HealthProbe};
pub use security::{SecurityProfile, SecurityProtocol};
pub use topics::{TopicManager, TopicRequest, TopicUpdate};
