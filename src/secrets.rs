//! Secret propagation with lazy, scoped decryption.
//!
//! A run's configuration carries zero or more [`RunSecret`]s. Values may be
//! plaintext or wrapped in an AES-256-GCM envelope; the envelope is detected
//! structurally so plaintext secrets pass through unchanged for backward
//! compatibility. Decryption happens exactly at point of use, when a secret
//! is materialized into the tool environment, and only secrets explicitly
//! flagged as exposable get there at all.
//!
//! # Envelope format
//!
//! `base64( salt[32] || nonce[12] || ciphertext+tag )`, with the data key
//! derived from the operator-supplied key string via PBKDF2-HMAC-SHA512
//! (100k iterations). Decrypted values are never persisted.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use miette::Diagnostic;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use thiserror::Error;

const SALT_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;
const KEY_LENGTH: usize = 32;
const PBKDF2_ROUNDS: u32 = 100_000;

/// A named secret attached to a run.
///
/// `value` may be plaintext or an encrypted envelope. Only secrets with
/// `expose` set are materialized into the tool-execution environment; the
/// rest stay opaque to node code.
#[derive(Clone, Serialize, Deserialize)]
pub struct RunSecret {
    /// Environment variable name under which the secret is exposed.
    pub name: String,
    /// Plaintext or enveloped value.
    pub value: String,
    /// Whether the secret may enter the tool environment.
    pub expose: bool,
}

// Manual Debug keeps secret values out of logs.
impl std::fmt::Debug for RunSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunSecret")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("expose", &self.expose)
            .finish()
    }
}

impl RunSecret {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>, expose: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            expose,
        }
    }
}

/// Errors raised while handling secrets.
#[derive(Debug, Error, Diagnostic)]
pub enum SecretError {
    /// An enveloped secret was encountered but no encryption key is
    /// configured. Fatal: secrets are never silently dropped.
    #[error("encrypted secret '{name}' present but no encryption key configured")]
    #[diagnostic(
        code(codeloom::secrets::configuration),
        help("Set the encryption key in EngineConfig (CODELOOM_ENCRYPTION_KEY).")
    )]
    MissingKey { name: String },

    /// The encryption key string is empty.
    #[error("encryption key cannot be empty")]
    #[diagnostic(code(codeloom::secrets::configuration))]
    EmptyKey,

    /// The envelope failed to decode or decrypt.
    #[error("failed to decrypt secret '{name}': {reason}")]
    #[diagnostic(
        code(codeloom::secrets::decryption),
        help("The envelope is corrupt or was produced with a different key.")
    )]
    DecryptionFailed { name: String, reason: String },
}

/// Symmetric cipher over the envelope format.
///
/// Constructed once from engine configuration; shared read-only across runs.
#[derive(Clone)]
pub struct SecretCipher {
    key: String,
}

impl SecretCipher {
    /// Creates a cipher from the operator-supplied key string.
    pub fn new(key: impl Into<String>) -> Result<Self, SecretError> {
        let key = key.into();
        if key.is_empty() {
            return Err(SecretError::EmptyKey);
        }
        Ok(Self { key })
    }

    fn derive_key(&self, salt: &[u8]) -> [u8; KEY_LENGTH] {
        let mut derived = [0u8; KEY_LENGTH];
        pbkdf2::pbkdf2_hmac::<Sha512>(self.key.as_bytes(), salt, PBKDF2_ROUNDS, &mut derived);
        derived
    }

    /// Encrypts a plaintext value into the envelope format.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, SecretError> {
        let mut salt = [0u8; SALT_LENGTH];
        let mut nonce = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut nonce);

        let derived = self.derive_key(&salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&derived));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| SecretError::DecryptionFailed {
                name: "<encrypt>".into(),
                reason: "AES-GCM encryption failed".into(),
            })?;

        let mut combined = Vec::with_capacity(SALT_LENGTH + NONCE_LENGTH + ciphertext.len());
        combined.extend_from_slice(&salt);
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    /// Decrypts an enveloped value back to plaintext.
    ///
    /// `name` is used only for error reporting.
    pub fn decrypt(&self, name: &str, envelope: &str) -> Result<String, SecretError> {
        let combined = BASE64
            .decode(envelope)
            .map_err(|e| SecretError::DecryptionFailed {
                name: name.to_string(),
                reason: format!("invalid base64: {e}"),
            })?;
        if combined.len() < SALT_LENGTH + NONCE_LENGTH + TAG_LENGTH {
            return Err(SecretError::DecryptionFailed {
                name: name.to_string(),
                reason: "envelope too short".into(),
            });
        }

        let (salt, rest) = combined.split_at(SALT_LENGTH);
        let (nonce, ciphertext) = rest.split_at(NONCE_LENGTH);

        let derived = self.derive_key(salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&derived));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SecretError::DecryptionFailed {
                name: name.to_string(),
                reason: "authentication failed".into(),
            })?;

        String::from_utf8(plaintext).map_err(|_| SecretError::DecryptionFailed {
            name: name.to_string(),
            reason: "plaintext is not valid UTF-8".into(),
        })
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

/// Structural detection of the envelope format.
///
/// A value is treated as enveloped when it is valid base64 of at least
/// `salt + nonce + tag + 1` bytes. Short strings never qualify, so ordinary
/// plaintext tokens that happen to be base64 keep passing through.
#[must_use]
pub fn is_enveloped(value: &str) -> bool {
    if value.len() <= 40 {
        return false;
    }
    match BASE64.decode(value) {
        Ok(decoded) => decoded.len() > SALT_LENGTH + NONCE_LENGTH + TAG_LENGTH,
        Err(_) => false,
    }
}

/// Resolves a secret value at point of use.
///
/// Plaintext passes through unchanged. Enveloped values require a cipher;
/// the absence of one is a fatal configuration error, never a silent drop.
pub fn resolve_value(
    name: &str,
    value: &str,
    cipher: Option<&SecretCipher>,
) -> Result<String, SecretError> {
    if !is_enveloped(value) {
        return Ok(value.to_string());
    }
    match cipher {
        Some(cipher) => cipher.decrypt(name, value),
        None => Err(SecretError::MissingKey {
            name: name.to_string(),
        }),
    }
}

/// Materializes the exposable secrets into environment pairs for the tool
/// executor. Non-exposable secrets are skipped entirely.
pub fn materialize_env(
    secrets: &[RunSecret],
    cipher: Option<&SecretCipher>,
) -> Result<Vec<(String, String)>, SecretError> {
    let mut env = Vec::new();
    for secret in secrets.iter().filter(|s| s.expose) {
        env.push((
            secret.name.clone(),
            resolve_value(&secret.name, &secret.value, cipher)?,
        ));
    }
    Ok(env)
}
