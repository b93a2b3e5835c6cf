//! Liveness checks for clusters, schema registries and connect runtimes.
//!
//! Every failure, including authentication errors and timeouts, reports
//! [`ClusterStatus::Offline`]. No retries happen here.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::cache::{ClusterTarget, ConnectionCache};
use crate::config::RestConfig;
use crate::error::GatewayError;
use crate::rest::{RestClient, RestEndpoint, RestService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterKind {
    Kafka,
    SchemaRegistry,
    KafkaConnect,
}

impl FromStr for ClusterKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kafka" => Ok(ClusterKind::Kafka),
            "schemaregistry" => Ok(ClusterKind::SchemaRegistry),
            "kafkaconnect" => Ok(ClusterKind::KafkaConnect),
            other => Err(GatewayError::invalid(format!("unknown cluster kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    Online,
    Offline,
}

impl ClusterStatus {
    pub fn is_online(self) -> bool {
        self == ClusterStatus::Online
    }
}

pub struct HealthProbe {
    cache: Arc<ConnectionCache>,
    rest: RestClient,
    rest_config: RestConfig,
    probe_timeout: Duration,
}

impl HealthProbe {
    pub fn new(cache: Arc<ConnectionCache>, rest: RestClient, rest_config: RestConfig, probe_timeout: Duration) -> Self {
        Self {
            cache,
            rest,
            rest_config,
            probe_timeout,
        }
    }

    /// Status by kind name: `kafka`, `schemaregistry` or `kafkaconnect`.
    /// Unknown kinds are offline.
    pub async fn status(&self, kind: &str, target: &ClusterTarget) -> ClusterStatus {
        match kind.parse::<ClusterKind>() {
            Ok(kind) => self.probe(kind, target).await,
            Err(e) => {
                debug!(error = %e, "status requested for unknown kind");
                ClusterStatus::Offline
            }
        }
    }

    #[instrument(skip(self, target), fields(cluster = target.cluster(), protocol = %target.protocol()))]
    pub async fn probe(&self, kind: ClusterKind, target: &ClusterTarget) -> ClusterStatus {
        let status = match kind {
            ClusterKind::Kafka => self.probe_kafka(target).await,
            ClusterKind::SchemaRegistry => self.probe_rest(RestService::SchemaRegistry, target).await,
            ClusterKind::KafkaConnect => self.probe_rest(RestService::KafkaConnect, target).await,
        };
        debug!(?kind, ?status, "probe finished");
        status
    }

    async fn probe_kafka(&self, target: &ClusterTarget) -> ClusterStatus {
        match timeout(self.probe_timeout, self.cache.get_connection(target)).await {
            Ok(Ok(_)) => ClusterStatus::Online,
            Ok(Err(e)) => {
                debug!(error = %e, "cluster probe failed");
                ClusterStatus::Offline
            }
            Err(_) => ClusterStatus::Offline,
        }
    }

    async fn probe_rest(&self, service: RestService, target: &ClusterTarget) -> ClusterStatus {
        let Some(host) = target.hosts().first() else {
            return ClusterStatus::Offline;
        };
        let endpoint = RestEndpoint::for_service(service, target.protocol(), host, &self.rest_config);
        match timeout(self.rest.timeout(), self.rest.get(&endpoint)).await {
            Ok(Ok(status)) if status.is_success() => ClusterStatus::Online,
            Ok(Ok(status)) => {
                debug!(endpoint = %endpoint, status = status.as_u16(), "service answered with error status");
                ClusterStatus::Offline
            }
            Ok(Err(e)) => {
                debug!(error = %e, "service probe failed");
                ClusterStatus::Offline
            }
            Err(_) => ClusterStatus::Offline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!("kafka".parse::<ClusterKind>().unwrap(), ClusterKind::Kafka);
        assert_eq!("SchemaRegistry".parse::<ClusterKind>().unwrap(), ClusterKind::SchemaRegistry);
        assert_eq!("kafkaconnect".parse::<ClusterKind>().unwrap(), ClusterKind::KafkaConnect);
        assert!("zookeeper".parse::<ClusterKind>().is_err());
    }

    #[test]
    fn test_status_flags() {
        assert!(ClusterStatus::Online.is_online());
        assert!(!ClusterStatus::Offline.is_online());
    }
}
