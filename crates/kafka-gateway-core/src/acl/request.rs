//! Validated access requests and the bindings they expand to.

use std::net::IpAddr;

use serde::Serialize;

use crate::cache::ClusterTarget;
use crate::error::{GatewayError, Result};
use crate::topics::validate_topic_name;

use super::binding::{AclBindingSpec, AclOperation, PatternKind, ResourceKind};

/// Host value meaning "from any address".
pub const ANY_HOST: &str = "*";

/// Principal value meaning "any user".
pub const ANY_PRINCIPAL: &str = "User:*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AclChange {
    Create,
    Delete,
}

/// How the caller identified the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    /// Any user connecting from one address.
    Ip,
    /// One named user (SSL DN or SASL username) from anywhere.
    Identity,
}

/// Producer or consumer, with the role-specific resource names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessRole {
    Producer { transactional_id: Option<String> },
    Consumer { consumer_group: String },
}

/// A fully validated access request.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    target: ClusterTarget,
    topic: String,
    role: AccessRole,
    principal_kind: PrincipalKind,
    principal_material: String,
    pattern: PatternKind,
    change: AclChange,
}

impl AccessRequest {
    /// Start a producer request.
    pub fn producer(target: ClusterTarget, topic: impl Into<String>) -> AccessRequestBuilder {
        AccessRequestBuilder::new(target, topic.into(), RoleDraft::Producer)
    }

    /// Start a consumer request.
    pub fn consumer(target: ClusterTarget, topic: impl Into<String>) -> AccessRequestBuilder {
        AccessRequestBuilder::new(target, topic.into(), RoleDraft::Consumer)
    }

    pub fn target(&self) -> &ClusterTarget {
        &self.target
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn role(&self) -> &AccessRole {
        &self.role
    }

    pub fn change(&self) -> AclChange {
        self.change
    }

    pub fn pattern(&self) -> PatternKind {
        self.pattern
    }

    /// `(principal, host)` for the bindings.
    pub fn principal_and_host(&self) -> (String, String) {
        match self.principal_kind {
            PrincipalKind::Ip => (ANY_PRINCIPAL.to_string(), self.principal_material.clone()),
            PrincipalKind::Identity => {
                (format!("User:{}", self.principal_material), ANY_HOST.to_string())
            }
        }
    }

    /// The bindings this request grants or revokes.
    ///
    /// Producers get topic WRITE and DESCRIBE, plus transactional-id WRITE
    /// when a transactional id is set. Consumers get topic READ and DESCRIBE
    /// plus consumer-group READ. Every binding carries the request's pattern.
    pub fn bindings(&self) -> Vec<AclBindingSpec> {
        let (principal, host) = self.principal_and_host();
        let bind = |kind: ResourceKind, name: &str, op: AclOperation| {
            AclBindingSpec::allow(kind, name, self.pattern, principal.clone(), host.clone(), op)
        };

        let mut bindings = Vec::with_capacity(3);
        match &self.role {
            AccessRole::Producer { transactional_id } => {
                bindings.push(bind(ResourceKind::Topic, &self.topic, AclOperation::Write));
                bindings.push(bind(ResourceKind::Topic, &self.topic, AclOperation::Describe));
                if let Some(txn) = transactional_id {
                    bindings.push(bind(ResourceKind::TransactionalId, txn, AclOperation::Write));
                }
            }
            AccessRole::Consumer { consumer_group } => {
                bindings.push(bind(ResourceKind::Topic, &self.topic, AclOperation::Read));
                bindings.push(bind(ResourceKind::Topic, &self.topic, AclOperation::Describe));
                bindings.push(bind(ResourceKind::ConsumerGroup, consumer_group, AclOperation::Read));
            }
        }
        bindings
    }
}

#[derive(Debug, Clone, Copy)]
enum RoleDraft {
    Producer,
    Consumer,
}

/// Collects request fields; [`build`](Self::build) validates them.
#[derive(Debug, Clone)]
pub struct AccessRequestBuilder {
    target: ClusterTarget,
    topic: String,
    role: RoleDraft,
    principals: Vec<(PrincipalKind, String)>,
    pattern: PatternKind,
    change: AclChange,
    transactional_id: Option<String>,
    consumer_group: Option<String>,
}

impl AccessRequestBuilder {
    fn new(target: ClusterTarget, topic: String, role: RoleDraft) -> Self {
        Self {
            target,
            topic,
            role,
            principals: Vec::new(),
            pattern: PatternKind::Literal,
            change: AclChange::Create,
            transactional_id: None,
            consumer_group: None,
        }
    }

    /// Identify the client by source address.
    pub fn ip(self, address: impl Into<String>) -> Self {
        self.principal(PrincipalKind::Ip, address)
    }

    /// Identify the client by principal name.
    pub fn identity(self, name: impl Into<String>) -> Self {
        self.principal(PrincipalKind::Identity, name)
    }

    pub fn principal(mut self, kind: PrincipalKind, material: impl Into<String>) -> Self {
        self.principals.push((kind, material.into()));
        self
    }

    pub fn pattern(mut self, pattern: PatternKind) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn change(mut self, change: AclChange) -> Self {
        self.change = change;
        self
    }

    /// Ignored for consumers. Blank means none.
    pub fn transactional_id(mut self, id: impl Into<String>) -> Self {
        self.transactional_id = Some(id.into());
        self
    }

    /// Required for consumers, ignored for producers.
    pub fn consumer_group(mut self, group: impl Into<String>) -> Self {
        self.consumer_group = Some(group.into());
        self
    }

    /// # Errors
    ///
    /// Returns `Invalid` if the topic name is malformed, the principal is
    /// missing, duplicated or malformed, or a consumer has no group.
    pub fn build(self) -> Result<AccessRequest> {
        validate_topic_name(&self.topic)?;

        let (principal_kind, material) = match self.principals.as_slice() {
            [(kind, material)] => (*kind, material.trim().to_string()),
            [] => return Err(GatewayError::invalid("an IP address or an identity is required")),
            _ => {
                return Err(GatewayError::invalid(
                    "supply exactly one of IP address or identity",
                ))
            }
        };
        match principal_kind {
            PrincipalKind::Ip => {
                material.parse::<IpAddr>().map_err(|_| {
                    GatewayError::invalid(format!("'{material}' is not an IP address"))
                })?;
            }
            PrincipalKind::Identity => {
                if material.is_empty() || material == "*" {
                    return Err(GatewayError::invalid("identity must name a principal"));
                }
            }
        }

        let role = match self.role {
            RoleDraft::Producer => AccessRole::Producer {
                transactional_id: self
                    .transactional_id
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty()),
            },
            RoleDraft::Consumer => {
                let group = self
                    .consumer_group
                    .map(|g| g.trim().to_string())
                    .filter(|g| !g.is_empty())
                    .ok_or_else(|| GatewayError::invalid("consumer requests need a consumer group"))?;
                AccessRole::Consumer { consumer_group: group }
            }
        };

        Ok(AccessRequest {
            target: self.target,
            topic: self.topic,
            role,
            principal_kind,
            principal_material: material,
            pattern: self.pattern,
            change: self.change,
        })
    }
}
