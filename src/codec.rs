//! Shareable-id codec
//!
//! Encrypts aggregator account identifiers into opaque tokens that are safe
//! to expose outside the application, and decrypts them back. The encoding
//! is deterministic (same input always yields the same token) and
//! collision-free over distinct inputs, so shareable ids can double as
//! stable external identifiers.
//!
//! # Envelope
//!
//! `sid:v1:<nonce_b64>:<ciphertext_b64>` with the URL-safe, unpadded base64
//! alphabet. The nonce is not random: it is derived from a keyed SHA-256
//! digest of the plaintext, which is what makes the encoding deterministic.
//! Determinism is safe here because each key only ever encrypts account
//! identifiers, which are unique upstream; equal ciphertexts therefore only
//! reveal that two ids are equal, which the scheme intends.
//!
//! The codec authenticates ciphertexts, so a tampered or wrong-key token
//! fails to decode instead of producing garbage.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use sha2::{Digest, Sha256};

use crate::types::LinkError;

const ENVELOPE_PREFIX: &str = "sid:v1:";

/// Domain separator mixed into nonce derivation so the same key material
/// used elsewhere can never produce a colliding nonce stream.
const NONCE_DOMAIN: &[u8] = b"shareable-id.nonce.v1";

/// Deterministic, reversible codec for account identifiers
///
/// Pure: holds only the key, performs no I/O. Cheap to clone and share.
#[derive(Clone)]
pub struct ShareableIdCodec {
    key: [u8; 32],
}

impl ShareableIdCodec {
    /// Create a codec over the given 32-byte key
    pub fn new(key: [u8; 32]) -> Self {
        ShareableIdCodec { key }
    }

    /// Encode a raw account identifier into a shareable id
    ///
    /// Deterministic: the same `raw_id` always yields the same token under
    /// the same key.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::EncodingError`] if `raw_id` is empty or the
    /// cipher cannot be initialized from the key.
    pub fn encode(&self, raw_id: &str) -> Result<String, LinkError> {
        if raw_id.is_empty() {
            return Err(LinkError::encoding("cannot encode an empty identifier"));
        }

        let nonce_bytes = self.derive_nonce(raw_id.as_bytes());
        let nonce = Nonce::from_slice(&nonce_bytes);
        let aead = ChaCha20Poly1305::new_from_slice(&self.key)
            .map_err(|error| LinkError::encoding(format!("cipher init failed: {error}")))?;
        let ciphertext = aead
            .encrypt(nonce, raw_id.as_bytes())
            .map_err(|error| LinkError::encoding(format!("encryption failed: {error}")))?;

        Ok(format!(
            "{ENVELOPE_PREFIX}{}:{}",
            URL_SAFE_NO_PAD.encode(nonce_bytes),
            URL_SAFE_NO_PAD.encode(ciphertext)
        ))
    }

    /// Decode a shareable id back into the raw account identifier
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::EncodingError`] if the envelope is malformed,
    /// the token was produced under a different key, or the ciphertext was
    /// tampered with.
    pub fn decode(&self, shareable_id: &str) -> Result<String, LinkError> {
        let body = shareable_id
            .strip_prefix(ENVELOPE_PREFIX)
            .ok_or_else(|| LinkError::encoding("unrecognized shareable id envelope"))?;

        let mut parts = body.split(':');
        let nonce_b64 = parts.next().unwrap_or_default();
        let ciphertext_b64 = parts.next().unwrap_or_default();
        if parts.next().is_some() || nonce_b64.is_empty() || ciphertext_b64.is_empty() {
            return Err(LinkError::encoding("unrecognized shareable id envelope"));
        }

        let nonce_raw = URL_SAFE_NO_PAD
            .decode(nonce_b64.as_bytes())
            .map_err(|error| LinkError::encoding(format!("invalid nonce encoding: {error}")))?;
        if nonce_raw.len() != 12 {
            return Err(LinkError::encoding("shareable id nonce length is invalid"));
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext_b64.as_bytes())
            .map_err(|error| LinkError::encoding(format!("invalid payload encoding: {error}")))?;

        let aead = ChaCha20Poly1305::new_from_slice(&self.key)
            .map_err(|error| LinkError::encoding(format!("cipher init failed: {error}")))?;
        let plaintext = aead
            .decrypt(Nonce::from_slice(&nonce_raw), ciphertext.as_ref())
            .map_err(|_| LinkError::encoding("shareable id failed authentication"))?;

        String::from_utf8(plaintext)
            .map_err(|error| LinkError::encoding(format!("decoded id is invalid utf8: {error}")))
    }

    /// First 12 bytes of SHA-256 over domain separator, key, and plaintext.
    fn derive_nonce(&self, plaintext: &[u8]) -> [u8; 12] {
        let mut hasher = Sha256::new();
        hasher.update(NONCE_DOMAIN);
        hasher.update(self.key);
        hasher.update(plaintext);
        let digest = hasher.finalize();

        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&digest[..12]);
        nonce
    }
}

impl std::fmt::Debug for ShareableIdCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareableIdCodec")
            .field("key", &"<redacted>")
            .finish()
    }
}
