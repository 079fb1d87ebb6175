//! Key derivation parameters
//!
//! The iteration count used for new tokens is configurable, and so is the
//! upper bound accepted from tokens being decoded. A token states its own
//! work factor, so without a bound a crafted token could make decryption
//! spin for an arbitrary amount of CPU time.

use crate::error::{ErrorCategory, ErrorKind, QrsealError, Result};

/// PBKDF2 iteration count used for newly encrypted records.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Largest iteration count accepted from an untrusted token.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    iterations: u32,
    max_iterations: u32,
}

impl KdfParams {
    /// Creates validated parameters.
    ///
    /// Both values must be positive and `iterations` may not exceed
    /// `max_iterations`, otherwise tokens we produce could not be read back.
    pub fn new(iterations: u32, max_iterations: u32) -> Result<Self> {
        if iterations == 0 {
            return Err(config_error("iterations must be at least 1"));
        }
        if max_iterations == 0 {
            return Err(config_error("max iterations must be at least 1"));
        }
        if iterations > max_iterations {
            return Err(config_error(format!(
                "iterations ({iterations}) exceed the configured maximum ({max_iterations})"
            )));
        }
        Ok(Self {
            iterations,
            max_iterations,
        })
    }

    /// Work factor for new encryptions.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Upper bound for the work factor of decoded tokens.
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

fn config_error(msg: impl Into<String>) -> QrsealError {
    QrsealError::with_kind(ErrorCategory::User, ErrorKind::Config, msg)
}
