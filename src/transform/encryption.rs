//! AEAD encryption providers.
//!
//! Each algorithm declares its key, nonce and tag sizes; key material is checked against
//! them before a cipher is constructed. A fresh random nonce is drawn for every call and
//! travels in front of the ciphertext:
//!
//! ```text
//! [nonce(N)] [ciphertext] [tag(16)]
//! ```
//!
//! Tag verification failures surface as `AuthenticationFailed`; structurally malformed
//! input (too short to hold a nonce and tag) as `DecryptionFailed`.

use crate::error::{constants, ErrorCode, Result, SerializerError};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce as AesNonce};
use chacha20poly1305::{ChaCha20Poly1305, Nonce as ChaNonce, XChaCha20Poly1305, XNonce};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[repr(u8)]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    TryFromPrimitive,
    IntoPrimitive,
)]
pub enum EncryptionAlgorithm {
    #[default]
    None = 0,
    Aes128Gcm = 1,
    Aes256Gcm = 2,
    ChaCha20Poly1305 = 3,
    XChaCha20Poly1305 = 4,
}

impl EncryptionAlgorithm {
    pub fn id(self) -> u8 {
        self.into()
    }

    pub fn from_id(id: u8) -> Result<Self> {
        Self::try_from_primitive(id).map_err(|_| {
            SerializerError::new(
                ErrorCode::UnsupportedAlgorithm,
                format!("unknown encryption algorithm id {id}"),
            )
        })
    }

    pub fn is_enabled(self) -> bool {
        self != EncryptionAlgorithm::None
    }

    pub fn key_size(self) -> usize {
        match self {
            EncryptionAlgorithm::None => 0,
            EncryptionAlgorithm::Aes128Gcm => 16,
            EncryptionAlgorithm::Aes256Gcm
            | EncryptionAlgorithm::ChaCha20Poly1305
            | EncryptionAlgorithm::XChaCha20Poly1305 => 32,
        }
    }

    pub fn nonce_size(self) -> usize {
        match self {
            EncryptionAlgorithm::None => 0,
            EncryptionAlgorithm::XChaCha20Poly1305 => 24,
            _ => 12,
        }
    }

    pub fn tag_size(self) -> usize {
        match self {
            EncryptionAlgorithm::None => 0,
            _ => 16,
        }
    }

    /// Bytes added to a plaintext of any length.
    pub fn overhead(self) -> usize {
        self.nonce_size() + self.tag_size()
    }

    pub fn name(self) -> &'static str {
        match self {
            EncryptionAlgorithm::None => "none",
            EncryptionAlgorithm::Aes128Gcm => "aes-128-gcm",
            EncryptionAlgorithm::Aes256Gcm => "aes-256-gcm",
            EncryptionAlgorithm::ChaCha20Poly1305 => "chacha20-poly1305",
            EncryptionAlgorithm::XChaCha20Poly1305 => "xchacha20-poly1305",
        }
    }

    /// Check `key` against the declared key size.
    pub fn validate_key(self, key: &EncryptionKey) -> Result<()> {
        if key.len() != self.key_size() {
            return Err(SerializerError::new(
                ErrorCode::InvalidEncryptionKey,
                format!(
                    "{} requires a {}-byte key, got {}",
                    self.name(),
                    self.key_size(),
                    key.len()
                ),
            ));
        }
        Ok(())
    }
}

/// Symmetric key material. Zeroed on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey(Vec<u8>);

impl EncryptionKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Random key sized for `algorithm`.
    pub fn generate(algorithm: EncryptionAlgorithm) -> Result<Self> {
        let mut bytes = vec![0u8; algorithm.key_size()];
        getrandom::fill(&mut bytes).map_err(|e| {
            SerializerError::new(ErrorCode::EncryptionFailed, format!("key generation: {e}"))
        })?;
        Ok(Self(bytes))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED; {}])", self.0.len())
    }
}

impl From<&[u8]> for EncryptionKey {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for EncryptionKey {
    fn from(bytes: [u8; N]) -> Self {
        Self::new(bytes.to_vec())
    }
}

/// Cipher instance selected by algorithm tag.
enum AeadImpl {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
    ChaCha(ChaCha20Poly1305),
    XChaCha(XChaCha20Poly1305),
}

impl AeadImpl {
    fn new(algorithm: EncryptionAlgorithm, key: &EncryptionKey) -> Result<Self> {
        algorithm.validate_key(key)?;
        let invalid = |_| {
            SerializerError::new(ErrorCode::InvalidEncryptionKey, "key rejected by cipher")
        };
        match algorithm {
            EncryptionAlgorithm::None => Err(SerializerError::new(
                ErrorCode::InvalidOperation,
                "no cipher for EncryptionAlgorithm::None",
            )),
            EncryptionAlgorithm::Aes128Gcm => Ok(Self::Aes128(Box::new(
                Aes128Gcm::new_from_slice(key.as_bytes()).map_err(invalid)?,
            ))),
            EncryptionAlgorithm::Aes256Gcm => Ok(Self::Aes256(Box::new(
                Aes256Gcm::new_from_slice(key.as_bytes()).map_err(invalid)?,
            ))),
            EncryptionAlgorithm::ChaCha20Poly1305 => Ok(Self::ChaCha(
                ChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(invalid)?,
            )),
            EncryptionAlgorithm::XChaCha20Poly1305 => Ok(Self::XChaCha(
                XChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(invalid)?,
            )),
        }
    }

    fn seal(&self, nonce: &[u8], aad: &[u8], msg: &[u8]) -> std::result::Result<Vec<u8>, aes_gcm::aead::Error> {
        let payload = Payload { msg, aad };
        match self {
            AeadImpl::Aes128(c) => c.encrypt(AesNonce::from_slice(nonce), payload),
            AeadImpl::Aes256(c) => c.encrypt(AesNonce::from_slice(nonce), payload),
            AeadImpl::ChaCha(c) => c.encrypt(ChaNonce::from_slice(nonce), payload),
            AeadImpl::XChaCha(c) => c.encrypt(XNonce::from_slice(nonce), payload),
        }
    }

    fn open(&self, nonce: &[u8], aad: &[u8], msg: &[u8]) -> std::result::Result<Vec<u8>, aes_gcm::aead::Error> {
        let payload = Payload { msg, aad };
        match self {
            AeadImpl::Aes128(c) => c.decrypt(AesNonce::from_slice(nonce), payload),
            AeadImpl::Aes256(c) => c.decrypt(AesNonce::from_slice(nonce), payload),
            AeadImpl::ChaCha(c) => c.decrypt(ChaNonce::from_slice(nonce), payload),
            AeadImpl::XChaCha(c) => c.decrypt(XNonce::from_slice(nonce), payload),
        }
    }
}

/// Encrypt `plaintext` under a fresh nonce. Returns `nonce || ciphertext || tag`.
pub fn encrypt(
    plaintext: &[u8],
    algorithm: EncryptionAlgorithm,
    key: &EncryptionKey,
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = AeadImpl::new(algorithm, key)?;

    let mut nonce = vec![0u8; algorithm.nonce_size()];
    getrandom::fill(&mut nonce).map_err(|e| {
        SerializerError::new(
            ErrorCode::EncryptionFailed,
            format!("{}: {e}", constants::ERR_NONCE_GENERATION),
        )
    })?;

    let sealed = cipher.seal(&nonce, aad, plaintext).map_err(|_| {
        SerializerError::new(
            ErrorCode::EncryptionFailed,
            format!("{} ({})", constants::ERR_ENCRYPTION_FAILED, algorithm.name()),
        )
    })?;

    let mut out = nonce;
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Split off the nonce, verify the tag and return the plaintext.
pub fn decrypt(
    body: &[u8],
    algorithm: EncryptionAlgorithm,
    key: &EncryptionKey,
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = AeadImpl::new(algorithm, key)?;

    if body.len() < algorithm.overhead() {
        return Err(SerializerError::new(
            ErrorCode::DecryptionFailed,
            format!(
                "{}: body of {} bytes cannot hold nonce and tag ({})",
                constants::ERR_DECRYPTION_FAILED,
                body.len(),
                algorithm.overhead()
            ),
        ));
    }

    let (nonce, sealed) = body.split_at(algorithm.nonce_size());
    cipher.open(nonce, aad, sealed).map_err(|_| {
        SerializerError::new(
            ErrorCode::AuthenticationFailed,
            constants::ERR_AUTHENTICATION_FAILED,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [EncryptionAlgorithm; 4] = [
        EncryptionAlgorithm::Aes128Gcm,
        EncryptionAlgorithm::Aes256Gcm,
        EncryptionAlgorithm::ChaCha20Poly1305,
        EncryptionAlgorithm::XChaCha20Poly1305,
    ];

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_every_algorithm_roundtrips() {
        for algorithm in ALL {
            let key = EncryptionKey::generate(algorithm).unwrap();
            let body = encrypt(b"secret state", algorithm, &key, b"aad").unwrap();
            assert_eq!(body.len(), 12 + algorithm.overhead());
            let plain = decrypt(&body, algorithm, &key, b"aad").unwrap();
            assert_eq!(plain, b"secret state");
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_nonce_is_fresh_per_call() {
        let algorithm = EncryptionAlgorithm::ChaCha20Poly1305;
        let key = EncryptionKey::generate(algorithm).unwrap();
        let a = encrypt(b"same", algorithm, &key, &[]).unwrap();
        let b = encrypt(b"same", algorithm, &key, &[]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_tampering_fails_authentication() {
        let algorithm = EncryptionAlgorithm::Aes256Gcm;
        let key = EncryptionKey::generate(algorithm).unwrap();
        let mut body = encrypt(b"payload", algorithm, &key, b"aad").unwrap();
        let last = body.len() - 1;
        body[last] ^= 0x01;
        let err = decrypt(&body, algorithm, &key, b"aad").unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthenticationFailed);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_wrong_aad_fails_authentication() {
        let algorithm = EncryptionAlgorithm::XChaCha20Poly1305;
        let key = EncryptionKey::generate(algorithm).unwrap();
        let body = encrypt(b"payload", algorithm, &key, b"type-a").unwrap();
        let err = decrypt(&body, algorithm, &key, b"type-b").unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthenticationFailed);
    }

    #[test]
    fn test_wrong_key_size_rejected_before_dispatch() {
        let key = EncryptionKey::new(vec![0u8; 16]);
        let err = encrypt(b"x", EncryptionAlgorithm::Aes256Gcm, &key, &[]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidEncryptionKey);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_truncated_body_is_decryption_failure() {
        let algorithm = EncryptionAlgorithm::ChaCha20Poly1305;
        let key = EncryptionKey::generate(algorithm).unwrap();
        let err = decrypt(&[0u8; 20], algorithm, &key, &[]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DecryptionFailed);
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = EncryptionKey::new(vec![0xAB; 32]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.to_lowercase().contains("ab, "));
    }
}
