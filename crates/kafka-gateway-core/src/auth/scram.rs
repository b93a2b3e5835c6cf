//! SCRAM client state machine.

use std::marker::PhantomData;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{AdminError, AdminResult};

/// Client nonce length in random bytes before base64.
pub const NONCE_LENGTH: usize = 24;

/// Minimum iteration count a server may ask for (RFC 7677).
pub const MIN_ITERATIONS: u32 = 4096;

/// Hash algorithm trait for SCRAM variants.
pub trait ScramHash: Send + Sync + std::fmt::Debug {
    /// The hash algorithm name.
    fn name() -> &'static str;
    /// Compute HMAC.
    fn hmac(key: &[u8], data: &[u8]) -> Vec<u8>;
    /// Compute hash.
    fn hash(data: &[u8]) -> Vec<u8>;
    /// Derive key using PBKDF2.
    fn pbkdf2(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8>;
}

/// SHA-256 implementation for SCRAM.
#[derive(Debug)]
pub struct ScramSha256;

impl ScramHash for ScramSha256 {
    fn name() -> &'static str {
        "SCRAM-SHA-256"
    }

    fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    fn hash(data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }

    fn pbkdf2(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
        let mut output = vec![0u8; 32];
        pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut output);
        output
    }
}

/// SHA-512 implementation for SCRAM.
#[derive(Debug)]
pub struct ScramSha512;

impl ScramHash for ScramSha512 {
    fn name() -> &'static str {
        "SCRAM-SHA-512"
    }

    fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha512>::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    fn hash(data: &[u8]) -> Vec<u8> {
        Sha512::digest(data).to_vec()
    }

    fn pbkdf2(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
        let mut output = vec![0u8; 64];
        pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut output);
        output
    }
}

/// First half of a SCRAM exchange.
///
/// ```text
/// client-first  n,,n=<user>,r=<client-nonce>
/// server-first  r=<nonce>,s=<salt>,i=<iterations>
/// client-final  c=biws,r=<nonce>,p=<proof>
/// server-final  v=<server-signature>
/// ```
#[derive(Debug)]
pub struct ScramClient<H: ScramHash> {
    password: String,
    client_nonce: String,
    client_first_bare: String,
    _hash: PhantomData<H>,
}

/// Holds the signature the server must present in its final message.
#[derive(Debug)]
pub struct ScramVerifier {
    expected: String,
}

impl<H: ScramHash> ScramClient<H> {
    pub fn new(username: &str, password: &str) -> Self {
        let random_bytes: [u8; NONCE_LENGTH] = rand::thread_rng().gen();
        Self::with_nonce(username, password, &BASE64.encode(random_bytes))
    }

    pub fn with_nonce(username: &str, password: &str, client_nonce: &str) -> Self {
        Self {
            password: password.to_string(),
            client_nonce: client_nonce.to_string(),
            client_first_bare: format!("n={},r={}", escape_username(username), client_nonce),
            _hash: PhantomData,
        }
    }

    /// The client-first message, with the no-channel-binding GS2 header.
    pub fn client_first(&self) -> String {
        format!("n,,{}", self.client_first_bare)
    }

    /// Consume the server-first message and produce the client-final message.
    pub fn client_final(self, server_first: &str) -> AdminResult<(String, ScramVerifier)> {
        let (nonce, salt, iterations) = parse_server_first(server_first)
            .map_err(|e| AdminError::Authentication(format!("bad server-first-message: {e}")))?;

        if !nonce.starts_with(&self.client_nonce) || nonce.len() == self.client_nonce.len() {
            return Err(AdminError::Authentication(
                "server nonce does not extend client nonce".to_string(),
            ));
        }
        if iterations < MIN_ITERATIONS {
            return Err(AdminError::Authentication(format!(
                "iteration count {iterations} below minimum {MIN_ITERATIONS}"
            )));
        }

        let salted_password = H::pbkdf2(self.password.as_bytes(), &salt, iterations);
        let client_key = H::hmac(&salted_password, b"Client Key");
        let stored_key = H::hash(&client_key);
        let server_key = H::hmac(&salted_password, b"Server Key");

        let without_proof = format!("c=biws,r={nonce}");
        let auth_message = format!("{},{},{}", self.client_first_bare, server_first, without_proof);

        let client_signature = H::hmac(&stored_key, auth_message.as_bytes());
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(a, b)| a ^ b)
            .collect();

        let server_signature = H::hmac(&server_key, auth_message.as_bytes());
        let verifier = ScramVerifier {
            expected: format!("v={}", BASE64.encode(server_signature)),
        };

        Ok((format!("{without_proof},p={}", BASE64.encode(proof)), verifier))
    }
}

impl ScramVerifier {
    pub fn verify(&self, server_final: &str) -> AdminResult<()> {
        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(AdminError::Authentication(format!("server rejected proof: {err}")));
        }
        if server_final != self.expected {
            return Err(AdminError::Authentication(
                "server signature verification failed".to_string(),
            ));
        }
        Ok(())
    }
}

/// RFC 5802 saslname escaping.
fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

fn parse_server_first(message: &str) -> Result<(String, Vec<u8>, u32), String> {
    let mut nonce = None;
    let mut salt = None;
    let mut iterations = None;

    for part in message.split(',') {
        if let Some(value) = part.strip_prefix("r=") {
            nonce = Some(value.to_string());
        } else if let Some(value) = part.strip_prefix("s=") {
            salt = Some(
                BASE64
                    .decode(value)
                    .map_err(|e| format!("invalid base64 salt: {e}"))?,
            );
        } else if let Some(value) = part.strip_prefix("i=") {
            iterations = Some(
                value
                    .parse::<u32>()
                    .map_err(|e| format!("invalid iteration count: {e}"))?,
            );
        }
    }

    Ok((
        nonce.ok_or("missing nonce (r=)")?,
        salt.ok_or("missing salt (s=)")?,
        iterations.ok_or("missing iteration count (i=)")?,
    ))
}
