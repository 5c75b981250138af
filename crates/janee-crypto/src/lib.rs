// SPDX-License-Identifier: MIT OR Apache-2.0
//! AES-256-GCM sealing primitives, master-key handling, and token ids.
//!
//! Every secret Janee persists is protected with [`seal`] and recovered with
//! [`open`]. The sealed wire format is `base64(iv ∥ tag ∥ ciphertext)` with a
//! 12-byte IV and a 16-byte tag. Sealing is non-deterministic (fresh IV per
//! call); opening authenticates before any plaintext is returned.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;
/// GCM initialisation-vector length in bytes.
pub const IV_LEN: usize = 12;
/// GCM authentication-tag length in bytes.
pub const TAG_LEN: usize = 16;
/// Default number of random bytes behind a generated token id.
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// Errors produced by the sealing primitives.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The key is not exactly [`KEY_LEN`] bytes.
    #[error("master key must be {KEY_LEN} bytes, got {len}")]
    InvalidKeyLength {
        /// Length of the rejected key.
        len: usize,
    },

    /// The sealed blob is not valid base64.
    #[error("sealed value is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded blob is shorter than `IV_LEN + TAG_LEN`.
    #[error("sealed value too short: {len} bytes")]
    TooShort {
        /// Length of the rejected blob after base64 decoding.
        len: usize,
    },

    /// Tag verification failed: wrong key or tampered data.
    #[error("failed to open sealed value: authentication failed")]
    OpenFailed,

    /// The AEAD encryption itself failed.
    #[error("failed to seal value")]
    SealFailed,

    /// The authenticated plaintext is not valid UTF-8.
    #[error("opened value is not valid UTF-8")]
    NotUtf8,
}

/// Generate a fresh 32-byte master key, base64-encoded for storage.
pub fn generate_master_key() -> String {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    BASE64.encode(key)
}

/// Decode a base64 master key, enforcing the exact [`KEY_LEN`] length.
pub fn master_key_from_base64(encoded: &str) -> Result<[u8; KEY_LEN], CryptoError> {
    let bytes = BASE64.decode(encoded.trim())?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength { len })
}

/// Seal a plaintext string under the master key.
///
/// Emits `base64(iv ∥ tag ∥ ciphertext)`. A fresh random IV is drawn on every
/// call, so sealing the same plaintext twice yields different outputs.
pub fn seal(plaintext: &str, key: &[u8]) -> Result<String, CryptoError> {
    let cipher = cipher_for(key)?;

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    // aes-gcm appends the tag to the ciphertext; the wire format carries it
    // between the IV and the ciphertext instead.
    let sealed = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::SealFailed)?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    let mut out = Vec::with_capacity(IV_LEN + TAG_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(tag);
    out.extend_from_slice(ciphertext);
    Ok(BASE64.encode(out))
}

/// Open a sealed value produced by [`seal`].
pub fn open(sealed: &str, key: &[u8]) -> Result<String, CryptoError> {
    let cipher = cipher_for(key)?;

    let blob = BASE64.decode(sealed.trim())?;
    if blob.len() < IV_LEN + TAG_LEN {
        return Err(CryptoError::TooShort { len: blob.len() });
    }

    let (iv, rest) = blob.split_at(IV_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);

    let mut sealed_input = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    sealed_input.extend_from_slice(ciphertext);
    sealed_input.extend_from_slice(tag);

    let nonce = Nonce::from_slice(iv);
    let plaintext = cipher
        .decrypt(nonce, sealed_input.as_ref())
        .map_err(|_| CryptoError::OpenFailed)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::NotUtf8)
}

/// Generate an opaque token id of the form `prefix_<hex>`, backed by
/// [`DEFAULT_TOKEN_BYTES`] random bytes.
pub fn generate_token(prefix: &str) -> String {
    generate_token_with(prefix, DEFAULT_TOKEN_BYTES)
}

/// [`generate_token`] with an explicit number of random bytes.
pub fn generate_token_with(prefix: &str, bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    format!("{prefix}_{}", hex::encode(buf))
}

/// Hex-encoded SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength { len: key.len() })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
