//! Password-based encryption using PBKDF2-HMAC-SHA256 + AES-256-GCM
//!
//! - PBKDF2 with SHA-256 stretches the password into a 256-bit key, using
//!   a fresh 16-byte salt and a stored iteration count
//! - AES-256-GCM with a fresh 12-byte IV encrypts and authenticates the
//!   UTF-8 plaintext, with no associated data
//!
//! The engine knows nothing about token formats; it produces and consumes
//! [`EncryptedRecord`]s. Every failure to recover a plaintext surfaces as
//! [`ErrorKind::DecryptionFailed`] with the same message, whatever the
//! cause, so callers cannot be used as an oracle.

use std::time::Instant;

use tracing::debug;
use zeroize::Zeroizing;

use crate::config::KdfParams;
use crate::error::{ErrorCategory, ErrorKind, QrsealError, Result};
use crate::provider::{CryptoProvider, KEY_LEN, SystemProvider};
use crate::record::{EncryptedRecord, IV_LEN, SALT_LEN};

/// The one message shown for any decryption failure.
pub const DECRYPTION_FAILED_MSG: &str = "decryption failed: wrong password or corrupted data";

#[derive(Debug, Clone, Default)]
pub struct CryptoEngine<P = SystemProvider> {
    provider: P,
    params: KdfParams,
}

impl CryptoEngine<SystemProvider> {
    /// Engine on the system provider with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: KdfParams) -> Self {
        Self::with_provider(SystemProvider, params)
    }
}

impl<P: CryptoProvider> CryptoEngine<P> {
    pub fn with_provider(provider: P, params: KdfParams) -> Self {
        Self { provider, params }
    }

    pub fn params(&self) -> KdfParams {
        self.params
    }

    /// Derive a 32-byte key from a password and salt.
    ///
    /// Deterministic: identical inputs always give the identical key, which
    /// is what lets decryption work at all. The key is wiped on drop.
    pub fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8; SALT_LEN],
        iterations: u32,
    ) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        if iterations == 0 {
            return Err(QrsealError::with_kind(
                ErrorCategory::User,
                ErrorKind::Config,
                "iterations must be at least 1",
            ));
        }

        let started = Instant::now();
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        self.provider
            .pbkdf2_sha256(password, salt, iterations, &mut key)?;
        debug!(
            iterations,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "derived key"
        );

        Ok(key)
    }

    /// Encrypt `plaintext` under `password` with a fresh salt and IV.
    ///
    /// Returns a complete record or nothing; the only failure mode is an
    /// unavailable random source or primitive ([`ErrorKind::CryptoUnavailable`]).
    pub fn encrypt(&self, password: &str, plaintext: &str) -> Result<EncryptedRecord> {
        let mut salt = [0u8; SALT_LEN];
        self.provider.fill_random(&mut salt)?;

        let iterations = self.params.iterations();
        let key = self.derive_key(password.as_bytes(), &salt, iterations)?;

        // Drawn separately from the salt.
        let mut iv = [0u8; IV_LEN];
        self.provider.fill_random(&mut iv)?;

        let ciphertext = self
            .provider
            .aes256_gcm_seal(&key, &iv, plaintext.as_bytes())?;

        Ok(EncryptedRecord::from_parts(salt, iterations, iv, ciphertext))
    }

    /// Decrypt `record` with `password`, returning the verified UTF-8 text.
    ///
    /// Wrong password, tampered ciphertext, swapped parameters and a
    /// non-UTF-8 payload all fail with [`ErrorKind::DecryptionFailed`] and
    /// [`DECRYPTION_FAILED_MSG`]. The specific cause is only available as
    /// the error's source.
    pub fn decrypt(&self, password: &str, record: &EncryptedRecord) -> Result<Zeroizing<String>> {
        if record.iterations() > self.params.max_iterations() {
            return Err(QrsealError::malformed(format!(
                "token asks for {} iterations, more than the allowed maximum of {}",
                record.iterations(),
                self.params.max_iterations()
            )));
        }

        let key = self.derive_key(password.as_bytes(), record.salt(), record.iterations())?;
        let mut plaintext = self
            .provider
            .aes256_gcm_open(&key, record.iv(), record.ciphertext())
            .map_err(|e| match e.kind {
                Some(ErrorKind::DecryptionFailed) => e.with_context(DECRYPTION_FAILED_MSG),
                _ => e,
            })?;

        match String::from_utf8(std::mem::take(&mut *plaintext)) {
            Ok(text) => Ok(Zeroizing::new(text)),
            Err(e) => {
                let cause = e.utf8_error();
                drop(Zeroizing::new(e.into_bytes()));
                Err(QrsealError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::DecryptionFailed,
                    DECRYPTION_FAILED_MSG,
                    cause,
                ))
            }
        }
    }
}
