//! Capability tokens for unauthenticated single-document reads.
//!
//! Stateless design: the token *is* the address. `issue` serializes the
//! `(entity, oid, fields)` triple as a colon-joined string, encrypts it
//! with AES-256-GCM under a key derived from the shared secret, and
//! wraps the nonce-prefixed ciphertext as hex, then base64, then the
//! URL-safe character substitution. Nothing is stored server-side, so a
//! token never expires and cannot be revoked short of rotating the
//! shared secret. `resolve` reverses every step and collapses *any*
//! failure — decoding, decryption, a malformed identifier — into `None`,
//! so token internals never leak through error responses.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use bson::oid::ObjectId;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

use crate::errors::GatewayError;

/// Domain-separation info for the token key derivation.
const TOKEN_INFO: &[u8] = b"docgate:public:token";
const NONCE_LEN: usize = 12;

/// The addressing triple a token authorizes: one document in one entity,
/// optionally restricted to a field projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub entity: String,
    pub oid: ObjectId,
    pub fields: Vec<String>,
}

impl Address {
    fn serialize(&self) -> String {
        let mut s = format!("{}:{}", self.entity, self.oid.to_hex());
        for f in &self.fields {
            s.push(':');
            s.push_str(f);
        }
        s
    }
}

fn derive_key(secret: &str) -> Result<[u8; 32], GatewayError> {
    let hk = Hkdf::<Sha256>::new(None, secret.as_bytes());
    let mut key = [0u8; 32];
    hk.expand(TOKEN_INFO, &mut key)
        .map_err(|e| GatewayError::PublishFailed(format!("key derivation: {e}")))?;
    Ok(key)
}

/// Issues a token for `addr`.
///
/// # Errors
/// `PublishFailed` when the cipher rejects the key material.
pub fn issue(secret: &str, addr: &Address) -> Result<String, GatewayError> {
    let key = derive_key(secret)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| GatewayError::PublishFailed(format!("cipher init: {e}")))?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ct = cipher
        .encrypt(nonce, addr.serialize().as_bytes())
        .map_err(|e| GatewayError::PublishFailed(format!("encrypt: {e}")))?;

    let mut framed = Vec::with_capacity(NONCE_LEN + ct.len());
    framed.extend_from_slice(&nonce_bytes);
    framed.extend_from_slice(&ct);

    let hex_text = hex::encode(framed);
    let base64_text = {
        use base64::{engine::general_purpose::STANDARD, Engine};
        STANDARD.encode(hex_text.as_bytes())
    };
    Ok(base64_text.replace('+', "-").replace('/', "_"))
}

/// Resolves a token back to the address it encodes. Any malformed or
/// undecryptable token is `None`.
#[must_use]
pub fn resolve(secret: &str, token: &str) -> Option<Address> {
    let base64_text = token.replace('-', "+").replace('_', "/");
    let hex_bytes = {
        use base64::{engine::general_purpose::STANDARD, Engine};
        STANDARD.decode(base64_text.as_bytes()).ok()?
    };
    let hex_text = String::from_utf8(hex_bytes).ok()?;
    let framed = hex::decode(hex_text).ok()?;
    if framed.len() <= NONCE_LEN {
        return None;
    }
    let (nonce_bytes, ct) = framed.split_at(NONCE_LEN);

    let key = derive_key(secret).ok()?;
    let cipher = Aes256Gcm::new_from_slice(&key).ok()?;
    let plain = cipher.decrypt(Nonce::from_slice(nonce_bytes), ct).ok()?;
    let text = String::from_utf8(plain).ok()?;

    let mut parts = text.split(':');
    let entity = parts.next()?.to_string();
    if entity.is_empty() {
        return None;
    }
    let oid = ObjectId::parse_str(parts.next()?).ok()?;
    let fields: Vec<String> = parts.map(ToString::to_string).collect();
    Some(Address { entity, oid, fields })
}
