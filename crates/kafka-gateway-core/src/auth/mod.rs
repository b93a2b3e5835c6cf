//! Client-side SASL exchanges for broker connections.
//!
//! - PLAIN sends `\0username\0password` in a single round trip.
//! - SCRAM-SHA-256 and SCRAM-SHA-512 (RFC 5802 / RFC 7677) take two round
//!   trips and verify the server signature at the end.
//!
//! GSSAPI is recognised by configuration but has no client implementation.

pub mod scram;

pub use scram::{ScramClient, ScramHash, ScramSha256, ScramSha512, ScramVerifier};

/// Build the SASL/PLAIN initial response.
pub fn plain_auth_bytes(username: &str, password: &str) -> Vec<u8> {
    format!("\0{username}\0{password}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_auth_bytes() {
        assert_eq!(plain_auth_bytes("admin", "pw"), b"\0admin\0pw".to_vec());
    }
}
