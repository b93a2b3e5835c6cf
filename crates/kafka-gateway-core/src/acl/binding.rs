//! ACL binding values and their Kafka wire codes.

use std::fmt;

use serde::Serialize;

/// Resource an ACL applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    Topic,
    ConsumerGroup,
    TransactionalId,
    Cluster,
}

/// How the resource name is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternKind {
    Literal,
    Prefixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AclOperation {
    All,
    Read,
    Write,
    Create,
    Delete,
    Alter,
    Describe,
    ClusterAction,
    DescribeConfigs,
    AlterConfigs,
    IdempotentWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AclPermission {
    Allow,
    Deny,
}

/// Wire code meaning "any" in a filter.
pub const ANY_CODE: i8 = 1;

impl ResourceKind {
    pub fn code(self) -> i8 {
        match self {
            Self::Topic => 2,
            Self::ConsumerGroup => 3,
            Self::Cluster => 4,
            Self::TransactionalId => 5,
        }
    }

    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            2 => Some(Self::Topic),
            3 => Some(Self::ConsumerGroup),
            4 => Some(Self::Cluster),
            5 => Some(Self::TransactionalId),
            _ => None,
        }
    }
}

impl PatternKind {
    pub fn code(self) -> i8 {
        match self {
            Self::Literal => 3,
            Self::Prefixed => 4,
        }
    }

    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            3 => Some(Self::Literal),
            4 => Some(Self::Prefixed),
            _ => None,
        }
    }
}

impl AclOperation {
    pub fn code(self) -> i8 {
        match self {
            Self::All => 2,
            Self::Read => 3,
            Self::Write => 4,
            Self::Create => 5,
            Self::Delete => 6,
            Self::Alter => 7,
            Self::Describe => 8,
            Self::ClusterAction => 9,
            Self::DescribeConfigs => 10,
            Self::AlterConfigs => 11,
            Self::IdempotentWrite => 12,
        }
    }

    pub fn from_code(code: i8) -> Option<Self> {
        Some(match code {
            2 => Self::All,
            3 => Self::Read,
            4 => Self::Write,
            5 => Self::Create,
            6 => Self::Delete,
            7 => Self::Alter,
            8 => Self::Describe,
            9 => Self::ClusterAction,
            10 => Self::DescribeConfigs,
            11 => Self::AlterConfigs,
            12 => Self::IdempotentWrite,
            _ => return None,
        })
    }
}

impl AclPermission {
    pub fn code(self) -> i8 {
        match self {
            Self::Deny => 2,
            Self::Allow => 3,
        }
    }

    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            2 => Some(Self::Deny),
            3 => Some(Self::Allow),
            _ => None,
        }
    }
}

/// One access-control rule. Constructed per request, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AclBindingSpec {
    pub resource_kind: ResourceKind,
    pub resource_name: String,
    pub pattern_kind: PatternKind,
    pub principal: String,
    pub host: String,
    pub operation: AclOperation,
    pub permission: AclPermission,
}

impl AclBindingSpec {
    /// An ALLOW binding.
    pub fn allow(
        resource_kind: ResourceKind,
        resource_name: impl Into<String>,
        pattern_kind: PatternKind,
        principal: impl Into<String>,
        host: impl Into<String>,
        operation: AclOperation,
    ) -> Self {
        Self {
            resource_kind,
            resource_name: resource_name.into(),
            pattern_kind,
            principal: principal.into(),
            host: host.into(),
            operation,
            permission: AclPermission::Allow,
        }
    }
}

impl fmt::Display for AclBindingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}:{} ({:?}) {}@{} {:?} {:?}",
            self.resource_kind,
            self.resource_name,
            self.pattern_kind,
            self.principal,
            self.host,
            self.operation,
            self.permission
        )
    }
}

/// Selects bindings. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AclBindingFilter {
    pub resource_kind: Option<ResourceKind>,
    pub resource_name: Option<String>,
    pub pattern_kind: Option<PatternKind>,
    pub principal: Option<String>,
    pub host: Option<String>,
    pub operation: Option<AclOperation>,
    pub permission: Option<AclPermission>,
}

impl AclBindingFilter {
    /// Matches every binding.
    pub fn any() -> Self {
        Self::default()
    }

    /// Matches exactly one binding.
    pub fn exact(spec: &AclBindingSpec) -> Self {
        Self {
            resource_kind: Some(spec.resource_kind),
            resource_name: Some(spec.resource_name.clone()),
            pattern_kind: Some(spec.pattern_kind),
            principal: Some(spec.principal.clone()),
            host: Some(spec.host.clone()),
            operation: Some(spec.operation),
            permission: Some(spec.permission),
        }
    }

    /// Field-by-field match, as a broker applies a LITERAL/PREFIXED filter.
    pub fn matches(&self, spec: &AclBindingSpec) -> bool {
        fn field<T: PartialEq>(want: &Option<T>, have: &T) -> bool {
            want.as_ref().map_or(true, |w| w == have)
        }
        field(&self.resource_kind, &spec.resource_kind)
            && field(&self.resource_name, &spec.resource_name)
            && field(&self.pattern_kind, &spec.pattern_kind)
            && field(&self.principal, &spec.principal)
            && field(&self.host, &spec.host)
            && field(&self.operation, &spec.operation)
            && field(&self.permission, &spec.permission)
    }
}
