//! qrseal - password-protected secret text tokens
//!
//! A secret text is encrypted with AES-256-GCM under a key stretched from a
//! password with PBKDF2-HMAC-SHA256, and the parameters needed to reverse it
//! are packed into one printable token suitable for copy-paste or a QR code.
//!
//! ```no_run
//! use qrseal::engine::CryptoEngine;
//! use qrseal::token::TokenCodec;
//!
//! # fn main() -> qrseal::error::Result<()> {
//! let engine = CryptoEngine::new();
//! let codec = TokenCodec::new();
//!
//! let token = codec.encode(&engine.encrypt("correct horse", "hello world")?);
//! let text = engine.decrypt("correct horse", &codec.decode(&token)?)?;
//! assert_eq!(text.as_str(), "hello world");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod ops;
pub mod passphrase;
pub mod provider;
pub mod record;
pub mod token;
