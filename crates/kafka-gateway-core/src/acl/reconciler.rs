//! Applies access requests against the cluster's ACLs.
//!
//! The cluster is the record of existing bindings. Creates check each
//! required binding first and mutate only when something is missing; deletes
//! go straight to a delete-by-filter. Neither path takes a lock: two racing
//! creates may both submit, and the broker treats a duplicate binding as
//! already present.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::admin::AdminHandle;
use crate::cache::{ClusterTarget, ConnectionCache};
use crate::error::{GatewayError, Result};

use super::binding::{AclBindingFilter, AclBindingSpec, AclOperation, ResourceKind};
use super::request::{AccessRequest, AclChange};

/// Result of a successful reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub change: AclChange,
    /// For creates: every binding was already present and nothing was sent.
    /// For deletes: at least one binding matched and was removed.
    pub existed: bool,
    pub bindings: Vec<AclBindingSpec>,
}

pub struct AclReconciler {
    cache: Arc<ConnectionCache>,
    operation_timeout: Duration,
}

impl AclReconciler {
    pub fn new(cache: Arc<ConnectionCache>, operation_timeout: Duration) -> Self {
        Self {
            cache,
            operation_timeout,
        }
    }

    /// Grant or revoke the bindings derived from `request`.
    ///
    /// # Errors
    ///
    /// `Unreachable` when no connection can be obtained and
    /// `PartialFailure` when the batch mutation fails. A failed batch may be
    /// partly applied; re-running the same request converges.
    #[instrument(
        skip(self, request),
        fields(topic = request.topic(), change = ?request.change(), cluster = request.target().cluster())
    )]
    pub async fn reconcile(&self, request: &AccessRequest) -> Result<ReconcileOutcome> {
        let client = self.cache.get_connection(request.target()).await?;
        let bindings = request.bindings();

        match request.change() {
            AclChange::Create => self.create(&client, bindings).await,
            AclChange::Delete => self.delete(&client, bindings).await,
        }
    }

    /// READ and WRITE grants on the cluster, without cluster-level bindings.
    pub async fn list_acls(&self, target: &ClusterTarget) -> Result<Vec<AclBindingSpec>> {
        let client = self.cache.get_connection(target).await?;
        let all = match timeout(self.operation_timeout, client.describe_acls(&AclBindingFilter::any())).await {
            Ok(result) => result.map_err(GatewayError::from)?,
            Err(_) => {
                return Err(GatewayError::timeout(format!(
                    "describe ACLs not answered within {}ms",
                    self.operation_timeout.as_millis()
                )))
            }
        };

        let mut bindings: Vec<AclBindingSpec> = all
            .into_iter()
            .filter(|b| b.resource_kind != ResourceKind::Cluster)
            .filter(|b| matches!(b.operation, AclOperation::Read | AclOperation::Write))
            .collect();
        bindings.sort();
        Ok(bindings)
    }

    async fn create(&self, client: &AdminHandle, bindings: Vec<AclBindingSpec>) -> Result<ReconcileOutcome> {
        let mut missing = 0;
        for binding in &bindings {
            if !self.exists(client, binding).await {
                missing += 1;
            }
        }

        if missing == 0 {
            info!(count = bindings.len(), "all bindings already present");
            return Ok(ReconcileOutcome {
                change: AclChange::Create,
                existed: true,
                bindings,
            });
        }

        match timeout(self.operation_timeout, client.create_acls(&bindings)).await {
            Ok(Ok(())) => {
                info!(count = bindings.len(), missing, "bindings created");
                Ok(ReconcileOutcome {
                    change: AclChange::Create,
                    existed: false,
                    bindings,
                })
            }
            Ok(Err(e)) => {
                error!(error = %e, "ACL creation failed");
                Err(GatewayError::partial_failure(format!("ACL creation failed: {e}")))
            }
            Err(_) => {
                error!(timeout_ms = self.operation_timeout.as_millis() as u64, "ACL creation timed out");
                Err(GatewayError::partial_failure(format!(
                    "ACL creation not acknowledged within {}ms",
                    self.operation_timeout.as_millis()
                )))
            }
        }
    }

    async fn delete(&self, client: &AdminHandle, bindings: Vec<AclBindingSpec>) -> Result<ReconcileOutcome> {
        let filters: Vec<AclBindingFilter> = bindings.iter().map(AclBindingFilter::exact).collect();

        match timeout(self.operation_timeout, client.delete_acls(&filters)).await {
            Ok(Ok(deleted)) => {
                info!(requested = bindings.len(), deleted = deleted.len(), "bindings deleted");
                Ok(ReconcileOutcome {
                    change: AclChange::Delete,
                    existed: !deleted.is_empty(),
                    bindings,
                })
            }
            Ok(Err(e)) => {
                error!(error = %e, "ACL deletion failed");
                Err(GatewayError::partial_failure(format!("ACL deletion failed: {e}")))
            }
            Err(_) => {
                error!(timeout_ms = self.operation_timeout.as_millis() as u64, "ACL deletion timed out");
                Err(GatewayError::partial_failure(format!(
                    "ACL deletion not acknowledged within {}ms",
                    self.operation_timeout.as_millis()
                )))
            }
        }
    }

    /// A failed check counts as absent; the create that follows is safe to
    /// repeat.
    async fn exists(&self, client: &AdminHandle, binding: &AclBindingSpec) -> bool {
        let filter = AclBindingFilter::exact(binding);
        match timeout(self.operation_timeout, client.describe_acls(&filter)).await {
            Ok(Ok(found)) => {
                let present = found.iter().any(|b| b == binding);
                debug!(binding = %binding, present, "existence check");
                present
            }
            Ok(Err(e)) => {
                warn!(binding = %binding, error = %e, "existence check failed");
                false
            }
            Err(_) => {
                warn!(binding = %binding, "existence check timed out");
                false
            }
        }
    }
}
