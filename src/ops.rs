//! High-level seal/open operations
//!
//! These tie the password readers, input gating, [`CryptoEngine`] and
//! [`TokenCodec`] together for callers that deal in text and files rather
//! than records. Files written here contain either a token or a recovered
//! secret, so they are created with mode 0o600 on Unix systems.

use crate::engine::CryptoEngine;
use crate::error::{ErrorCategory, ErrorKind, QrsealError, Result};
use crate::passphrase::PassphraseReader;
use crate::provider::CryptoProvider;
use crate::token::{self, TokenCodec, TokenFormat};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::debug;
use zeroize::Zeroizing;

/// Reject an empty or whitespace-only password.
pub fn validate_password(password: &str) -> Result<()> {
    if password.trim().is_empty() {
        return Err(QrsealError::validation("password must not be empty"));
    }
    Ok(())
}

/// Reject an empty or whitespace-only secret text.
pub fn validate_plaintext(plaintext: &str) -> Result<()> {
    if plaintext.trim().is_empty() {
        return Err(QrsealError::validation("text to encrypt must not be empty"));
    }
    Ok(())
}

/// Encrypt `plaintext` and return the canonical token.
pub fn seal_text<P: CryptoProvider>(
    engine: &CryptoEngine<P>,
    passphrase_reader: &mut dyn PassphraseReader,
    plaintext: &str,
) -> Result<String> {
    validate_plaintext(plaintext)?;
    let passphrase = passphrase_reader.read_passphrase()?;
    validate_password(&passphrase)?;

    let record = engine
        .encrypt(&passphrase, plaintext)
        .map_err(|e| e.with_context("encryption failed"))?;
    Ok(TokenCodec::new().encode(&record))
}

/// Decode `token` (either format) and decrypt it.
pub fn open_token<P: CryptoProvider>(
    engine: &CryptoEngine<P>,
    codec: &TokenCodec,
    passphrase_reader: &mut dyn PassphraseReader,
    token: &str,
) -> Result<Zeroizing<String>> {
    if token.trim().is_empty() {
        return Err(QrsealError::validation("token must not be empty"));
    }
    let (record, format) = codec.decode_with_format(token)?;
    if format == TokenFormat::Legacy {
        debug!("token uses the legacy unwrapped JSON form");
    }

    let passphrase = passphrase_reader.read_passphrase()?;
    validate_password(&passphrase)?;
    engine.decrypt(&passphrase, &record)
}

/// Decode `token` and return its record as pretty-printed JSON.
///
/// No password is needed; the record holds no secret material.
pub fn export_json(codec: &TokenCodec, token: &str) -> Result<String> {
    if token.trim().is_empty() {
        return Err(QrsealError::validation("token must not be empty"));
    }
    let record = codec.decode(token)?;
    Ok(token::to_json_pretty(&record))
}

/// Encrypt the text in `input_path` and write the token to `output_path`.
pub fn seal_file<P: CryptoProvider>(
    engine: &CryptoEngine<P>,
    input_path: &Path,
    output_path: &Path,
    passphrase_reader: &mut dyn PassphraseReader,
) -> Result<()> {
    let plaintext = read_text(input_path)?;
    let sealed = seal_text(engine, passphrase_reader, &plaintext)?;
    write_file_secure(output_path, sealed.as_bytes())
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;
    Ok(())
}

/// Decrypt the token in `input_path` and write the text to `output_path`.
pub fn open_file<P: CryptoProvider>(
    engine: &CryptoEngine<P>,
    codec: &TokenCodec,
    input_path: &Path,
    output_path: &Path,
    passphrase_reader: &mut dyn PassphraseReader,
) -> Result<()> {
    let sealed = read_text(input_path)?;
    let plaintext = open_token(engine, codec, passphrase_reader, &sealed)?;
    write_file_secure(output_path, plaintext.as_bytes())
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;
    Ok(())
}

/// Read a UTF-8 text file.
pub fn read_text(path: &Path) -> Result<Zeroizing<String>> {
    let bytes = fs::read(path).map_err(|e| read_error(path, e))?;
    let text = String::from_utf8(bytes).map_err(|e| {
        let cause = e.utf8_error();
        drop(Zeroizing::new(e.into_bytes()));
        QrsealError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Validation,
            format!("{} is not valid UTF-8", path.display()),
            cause,
        )
    })?;
    Ok(Zeroizing::new(text))
}

/// Write file with secure permissions (0o600 on Unix)
pub fn write_file_secure(path: &Path, contents: &[u8]) -> Result<()> {
    #[cfg(unix)]
    {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(|e| {
                QrsealError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::Io,
                    format!("failed to open {}", path.display()),
                    e,
                )
            })?;

        file.write_all(contents).map_err(|e| {
            QrsealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to write {}", path.display()),
                e,
            )
        })?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents).map_err(|e| {
            QrsealError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to write {}", path.display()),
                e,
            )
        })?;
        Ok(())
    }
}

fn read_error(path: &Path, err: io::Error) -> QrsealError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    QrsealError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}
