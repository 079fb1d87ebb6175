//! Cryptographic primitives behind a substitutable seam
//!
//! [`CryptoEngine`](crate::engine::CryptoEngine) never calls a primitive
//! crate directly; it goes through a [`CryptoProvider`]. The production
//! provider is [`SystemProvider`], backed by the operating system CSPRNG,
//! `pbkdf2` + `sha2` and `aes-gcm`. Tests substitute providers with fixed
//! random output or failing primitives.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, QrsealError, Result};
use crate::record::IV_LEN;

/// Length of the derived AES-256 key in bytes
pub const KEY_LEN: usize = 32;

pub trait CryptoProvider: Send + Sync {
    /// Fill `buf` with output of a cryptographically secure random number
    /// generator. A general-purpose PRNG is never acceptable here.
    fn fill_random(&self, buf: &mut [u8]) -> Result<()>;

    /// PBKDF2 with HMAC-SHA256 as the PRF, writing a 256-bit key into `out`.
    fn pbkdf2_sha256(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        out: &mut [u8; KEY_LEN],
    ) -> Result<()>;

    /// AES-256-GCM encryption without associated data. Returns ciphertext
    /// with the 16-byte tag appended.
    fn aes256_gcm_seal(
        &self,
        key: &[u8; KEY_LEN],
        iv: &[u8; IV_LEN],
        plaintext: &[u8],
    ) -> Result<Vec<u8>>;

    /// AES-256-GCM decryption without associated data. Tag mismatch must
    /// fail with [`ErrorKind::DecryptionFailed`] and yield no output.
    fn aes256_gcm_open(
        &self,
        key: &[u8; KEY_LEN],
        iv: &[u8; IV_LEN],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>>;
}

/// Provider backed by the OS random source and the RustCrypto crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProvider;

impl CryptoProvider for SystemProvider {
    fn fill_random(&self, buf: &mut [u8]) -> Result<()> {
        OsRng.try_fill_bytes(buf).map_err(|e| {
            QrsealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::CryptoUnavailable,
                format!("secure random source unavailable: {}", e),
                e,
            )
        })
    }

    fn pbkdf2_sha256(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        out: &mut [u8; KEY_LEN],
    ) -> Result<()> {
        pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, out);
        Ok(())
    }

    fn aes256_gcm_seal(
        &self,
        key: &[u8; KEY_LEN],
        iv: &[u8; IV_LEN],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        cipher
            .encrypt(&Nonce::from(*iv), plaintext)
            .map_err(|e| {
                QrsealError::with_kind(
                    ErrorCategory::Internal,
                    ErrorKind::CryptoUnavailable,
                    format!("AES-GCM encryption failed: {}", e),
                )
            })
    }

    fn aes256_gcm_open(
        &self,
        key: &[u8; KEY_LEN],
        iv: &[u8; IV_LEN],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        cipher
            .decrypt(&Nonce::from(*iv), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| {
                QrsealError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::DecryptionFailed,
                    "authentication tag mismatch",
                )
            })
    }
}
