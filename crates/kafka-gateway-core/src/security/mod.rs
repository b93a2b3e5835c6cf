//! Security profiles for administrative connections.
//!
//! A [`SecurityProtocol`] names one of the six supported ways of reaching a
//! cluster. [`ProfileBuilder`] turns a protocol and a cluster identity into a
//! [`SecurityProfile`] carrying everything a client needs to connect.

mod jaas;
mod profile;
mod protocol;

pub use jaas::JaasCredentials;
pub use profile::{ClientTuning, ProfileBuilder, SaslSettings, SecurityProfile};
pub use protocol::{SaslMechanism, SecurityProtocol};
