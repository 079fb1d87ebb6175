//! Password acquisition

use crate::error::{ErrorCategory, ErrorKind, QrsealError, Result};
use std::io::{self, IsTerminal, Read, Write};
use zeroize::Zeroizing;

/// Trait for reading passwords from various sources
pub trait PassphraseReader {
    /// Read a password as UTF-8 text.
    ///
    /// Returns the password wrapped in `Zeroizing` to ensure it is securely
    /// wiped from memory when dropped.
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>>;
}

/// Returns a fixed password (for testing)
pub struct ConstantPassphraseReader {
    passphrase: Zeroizing<String>,
}

impl ConstantPassphraseReader {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
        }
    }
}

impl PassphraseReader for ConstantPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        Ok(self.passphrase.clone())
    }
}

/// Reads a password from any io::Read source, typically stdin
///
/// The whole stream is the password, minus one trailing line ending so
/// that `echo secret | qrseal ...` behaves as expected.
pub struct ReaderPassphraseReader {
    reader: Box<dyn Read>,
}

impl ReaderPassphraseReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl PassphraseReader for ReaderPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader.read_to_end(&mut data).map_err(|e| {
            QrsealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("error reading passphrase: {}", e),
                e,
            )
        })?;

        let text = std::str::from_utf8(&data).map_err(|e| {
            QrsealError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Validation,
                "passphrase is not valid UTF-8",
                e,
            )
        })?;
        let text = text
            .strip_suffix('\n')
            .map(|t| t.strip_suffix('\r').unwrap_or(t))
            .unwrap_or(text);

        Ok(Zeroizing::new(text.to_owned()))
    }
}

/// Reads password from terminal with no echo
pub struct TerminalPassphraseReader {
    prompt: &'static str,
}

impl TerminalPassphraseReader {
    pub fn new() -> Self {
        Self::with_prompt("Password (qrseal): ")
    }

    pub fn with_prompt(prompt: &'static str) -> Self {
        Self { prompt }
    }
}

impl Default for TerminalPassphraseReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PassphraseReader for TerminalPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        if !io::stdin().is_terminal() {
            return Err(QrsealError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "cannot read passphrase from terminal - stdin is not a terminal",
            ));
        }

        io::stderr().write_all(self.prompt.as_bytes()).map_err(|e| {
            QrsealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to write prompt: {}", e),
                e,
            )
        })?;
        io::stderr().flush().map_err(|e| {
            QrsealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to flush prompt: {}", e),
                e,
            )
        })?;

        // Read password *without echo*
        let passphrase = rpassword::read_password().map_err(|e| {
            QrsealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PassphraseUnavailable,
                format!("failure reading passphrase: {}", e),
                e,
            )
        })?;

        Ok(Zeroizing::new(passphrase))
    }
}

/// Reads a password and its repetition from two readers and requires both
/// entries to match. Guards against typos when encrypting.
pub struct ConfirmingPassphraseReader {
    entry: Box<dyn PassphraseReader>,
    repeat: Box<dyn PassphraseReader>,
}

impl ConfirmingPassphraseReader {
    pub fn new(entry: Box<dyn PassphraseReader>, repeat: Box<dyn PassphraseReader>) -> Self {
        Self { entry, repeat }
    }

    /// Confirmation over the terminal, with a second "Repeat password" prompt.
    pub fn terminal() -> Self {
        Self::new(
            Box::new(TerminalPassphraseReader::new()),
            Box::new(TerminalPassphraseReader::with_prompt("Repeat password: ")),
        )
    }
}

impl PassphraseReader for ConfirmingPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        let passphrase = self.entry.read_passphrase()?;
        let again = self.repeat.read_passphrase()?;
        if *again != *passphrase {
            return Err(QrsealError::validation("passwords do not match"));
        }
        Ok(passphrase)
    }
}
