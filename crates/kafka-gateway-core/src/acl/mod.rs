//! Producer and consumer access grants.
//!
//! - [`binding`] - ACL values and their wire codes
//! - [`request`] - validated access requests and binding derivation
//! - [`reconciler`] - idempotent apply against the cluster

pub mod binding;
pub mod reconciler;
pub mod request;

pub use binding::{
    AclBindingFilter, AclBindingSpec, AclOperation, AclPermission, PatternKind, ResourceKind,
    ANY_CODE,
};
pub use reconciler::{AclReconciler, ReconcileOutcome};
pub use request::{
    AccessRequest, AccessRequestBuilder, AccessRole, AclChange, PrincipalKind, ANY_HOST,
    ANY_PRINCIPAL,
};
