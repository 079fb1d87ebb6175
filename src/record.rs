//! The encrypted record: everything needed, besides the password, to
//! recover a plaintext.

/// Length of the PBKDF2 salt in bytes
pub const SALT_LEN: usize = 16;

/// Length of the AES-GCM initialization vector in bytes
pub const IV_LEN: usize = 12;

/// Length of the GCM authentication tag appended to every ciphertext
pub const TAG_LEN: usize = 16;

/// Salt, work factor, IV and AEAD output of one encryption.
///
/// Records are only built by [`crate::engine::CryptoEngine::encrypt`] or by
/// validated token decoding, and cannot be modified afterwards. The fixed
/// array types carry the salt and IV length invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedRecord {
    salt: [u8; SALT_LEN],
    iterations: u32,
    iv: [u8; IV_LEN],
    ciphertext: Vec<u8>,
}

impl EncryptedRecord {
    /// Callers must have checked `iterations > 0`.
    pub(crate) fn from_parts(
        salt: [u8; SALT_LEN],
        iterations: u32,
        iv: [u8; IV_LEN],
        ciphertext: Vec<u8>,
    ) -> Self {
        debug_assert!(iterations > 0);
        Self {
            salt,
            iterations,
            iv,
            ciphertext,
        }
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    /// Encrypted payload followed by the 16-byte tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}
