//! Token encoding for encrypted records
//!
//! A token is a single printable string suitable for pasting or for a QR
//! code. The canonical format is base64 over the JSON text of the record:
//!
//! ```text
//! base64({"iv":"<b64>","encrypted":"<b64>","iterations":100000,"salt":"<b64>"})
//! ```
//!
//! Tokens from earlier releases carried the JSON text directly, without the
//! outer base64 layer. Both forms are accepted on decode; only the
//! canonical form is produced.
//!
//! Byte fields use the standard base64 alphabet and are written padded.
//! Decoding does not insist on padding.

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde_json::{Map, Value};
use tracing::trace;

use crate::config::DEFAULT_MAX_ITERATIONS;
use crate::error::{QrsealError, Result};
use crate::record::{EncryptedRecord, IV_LEN, SALT_LEN};

/// Standard alphabet, padding optional on decode.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Which of the two accepted token layouts an input used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFormat {
    /// base64 of the JSON record
    Canonical,
    /// The JSON record text itself
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCodec {
    max_iterations: u32,
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl TokenCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec that rejects tokens whose iteration count exceeds `max_iterations`.
    pub fn with_max_iterations(max_iterations: u32) -> Self {
        Self { max_iterations }
    }

    /// Encode a record as a canonical token.
    pub fn encode(&self, record: &EncryptedRecord) -> String {
        STANDARD.encode(to_json(record))
    }

    /// Decode a token of either format into a validated record.
    pub fn decode(&self, token: &str) -> Result<EncryptedRecord> {
        self.decode_with_format(token).map(|(record, _)| record)
    }

    /// Like [`decode`](Self::decode), also reporting which format matched.
    ///
    /// The canonical form is tried first. If it fails, the input is parsed
    /// as a legacy JSON record. Both stages run the same field validation.
    /// When both fail, the error of the stage the input most resembles is
    /// returned: legacy if it looks like a JSON object, canonical otherwise.
    pub fn decode_with_format(&self, token: &str) -> Result<(EncryptedRecord, TokenFormat)> {
        let token = token.trim();

        let canonical_err = match self.decode_canonical(token) {
            Ok(record) => {
                trace!("decoded canonical token");
                return Ok((record, TokenFormat::Canonical));
            }
            Err(e) => e,
        };

        match self.decode_legacy(token) {
            Ok(record) => {
                trace!("decoded legacy token");
                Ok((record, TokenFormat::Legacy))
            }
            Err(legacy_err) if token.starts_with('{') => Err(legacy_err),
            Err(_) => Err(canonical_err),
        }
    }

    /// ASCII whitespace anywhere in the token is skipped, so tokens that
    /// were line-wrapped when pasted still decode.
    fn decode_canonical(&self, token: &str) -> Result<EncryptedRecord> {
        let compact: String = token.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let json_bytes = LENIENT.decode(&compact).map_err(|e| {
            QrsealError::malformed(format!("token is not valid base64: {}", e))
        })?;
        let json = std::str::from_utf8(&json_bytes).map_err(|e| {
            QrsealError::malformed(format!("decoded token is not UTF-8 text: {}", e))
        })?;
        self.parse_record(json)
    }

    fn decode_legacy(&self, token: &str) -> Result<EncryptedRecord> {
        self.parse_record(token)
    }

    fn parse_record(&self, json: &str) -> Result<EncryptedRecord> {
        let value: Value = serde_json::from_str(json).map_err(|e| {
            QrsealError::malformed(format!("token does not contain a JSON record: {}", e))
        })?;
        let Value::Object(fields) = value else {
            return Err(QrsealError::malformed("token record is not a JSON object"));
        };
        self.validate(&fields)
    }

    /// Checks presence and type of every field before building the record.
    fn validate(&self, fields: &Map<String, Value>) -> Result<EncryptedRecord> {
        let iv = bytes_field(fields, "iv")?;
        let ciphertext = bytes_field(fields, "encrypted")?;
        let salt = bytes_field(fields, "salt")?;
        let iterations = iterations_field(fields)?;

        if iterations > self.max_iterations {
            return Err(QrsealError::malformed(format!(
                "iterations ({}) exceed the allowed maximum of {}",
                iterations, self.max_iterations
            )));
        }

        let salt: [u8; SALT_LEN] = salt.try_into().map_err(|v: Vec<u8>| {
            QrsealError::malformed(format!(
                "salt must be {} bytes, got {}",
                SALT_LEN,
                v.len()
            ))
        })?;
        let iv: [u8; IV_LEN] = iv.try_into().map_err(|v: Vec<u8>| {
            QrsealError::malformed(format!("iv must be {} bytes, got {}", IV_LEN, v.len()))
        })?;

        Ok(EncryptedRecord::from_parts(salt, iterations, iv, ciphertext))
    }
}

fn bytes_field(fields: &Map<String, Value>, name: &str) -> Result<Vec<u8>> {
    let text = match fields.get(name) {
        Some(Value::String(text)) => text,
        Some(_) => {
            return Err(QrsealError::malformed(format!(
                "field '{}' must be a string",
                name
            )));
        }
        None => {
            return Err(QrsealError::malformed(format!(
                "missing field '{}'",
                name
            )));
        }
    };
    LENIENT.decode(text).map_err(|e| {
        QrsealError::malformed(format!("field '{}' is not valid base64: {}", name, e))
    })
}

fn iterations_field(fields: &Map<String, Value>) -> Result<u32> {
    let number = match fields.get("iterations") {
        Some(Value::Number(number)) => number,
        Some(_) => return Err(QrsealError::malformed("field 'iterations' must be a number")),
        None => return Err(QrsealError::malformed("missing field 'iterations'")),
    };
    match number.as_u64().and_then(|n| u32::try_from(n).ok()) {
        Some(n) if n > 0 => Ok(n),
        _ => Err(QrsealError::malformed(format!(
            "iterations must be a positive integer, got {}",
            number
        ))),
    }
}

/// Keys in the order earlier releases emitted them.
fn wire_value(record: &EncryptedRecord) -> Value {
    let mut fields = Map::new();
    fields.insert("iv".into(), Value::from(STANDARD.encode(record.iv())));
    fields.insert(
        "encrypted".into(),
        Value::from(STANDARD.encode(record.ciphertext())),
    );
    fields.insert("iterations".into(), Value::from(record.iterations()));
    fields.insert("salt".into(), Value::from(STANDARD.encode(record.salt())));
    Value::Object(fields)
}

/// Compact JSON text of a record; the inner layer of a canonical token and
/// the whole of a legacy one.
pub fn to_json(record: &EncryptedRecord) -> String {
    wire_value(record).to_string()
}

/// Pretty-printed JSON text of a record, for display and export.
pub fn to_json_pretty(record: &EncryptedRecord) -> String {
    format!("{:#}", wire_value(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample_record() -> EncryptedRecord {
        EncryptedRecord::from_parts([0x11; SALT_LEN], 100_000, [0x22; IV_LEN], vec![0x33; 27])
    }

    fn assert_malformed(result: Result<EncryptedRecord>) {
        let err = result.expect_err("expected malformed token");
        assert_eq!(err.kind, Some(ErrorKind::MalformedToken));
    }

    fn wrap(json: &str) -> String {
        STANDARD.encode(json)
    }

    #[test]
    fn test_roundtrip() {
        let codec = TokenCodec::new();
        let record = sample_record();

        let token = codec.encode(&record);
        let (decoded, format) = codec.decode_with_format(&token).unwrap();

        assert_eq!(decoded, record);
        assert_eq!(format, TokenFormat::Canonical);
    }

    #[test]
    fn test_exact_wire_format() {
        let json = to_json(&sample_record());
        assert_eq!(
            json,
            r#"{"iv":"IiIiIiIiIiIiIiIi","encrypted":"MzMzMzMzMzMzMzMzMzMzMzMzMzMzMzMzMzMz","iterations":100000,"salt":"EREREREREREREREREREREQ=="}"#
        );
        assert_eq!(TokenCodec::new().encode(&sample_record()), wrap(&json));
    }

    #[test]
    fn test_token_is_single_line() {
        let token = TokenCodec::new().encode(&sample_record());
        assert!(!token.contains(char::is_whitespace));
    }

    #[test]
    fn test_legacy_json_accepted() {
        let codec = TokenCodec::new();
        let record = sample_record();

        let (decoded, format) = codec.decode_with_format(&to_json(&record)).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(format, TokenFormat::Legacy);

        let (decoded, format) = codec.decode_with_format(&to_json_pretty(&record)).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(format, TokenFormat::Legacy);
    }

    #[test]
    fn test_legacy_field_order_irrelevant() {
        let json = r#"{"salt":"EREREREREREREREREREREQ==","iterations":100000,"encrypted":"MzMzMzMzMzMzMzMzMzMzMzMzMzMzMzMzMzMz","iv":"IiIiIiIiIiIiIiIi"}"#;
        assert_eq!(TokenCodec::new().decode(json).unwrap(), sample_record());
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        let codec = TokenCodec::new();
        let token = format!("  {}\n", codec.encode(&sample_record()));
        assert_eq!(codec.decode(&token).unwrap(), sample_record());
    }

    #[test]
    fn test_line_wrapped_token_accepted() {
        let codec = TokenCodec::new();
        let token = codec.encode(&sample_record());
        let lines: Vec<String> = token
            .as_bytes()
            .chunks(20)
            .map(|chunk| String::from_utf8(chunk.to_vec()).unwrap())
            .collect();

        let (record, format) = codec.decode_with_format(&lines.join("\n")).unwrap();
        assert_eq!(record, sample_record());
        assert_eq!(format, TokenFormat::Canonical);

        let (record, _) = codec.decode_with_format(&lines.join("\r\n  \t")).unwrap();
        assert_eq!(record, sample_record());
    }

    #[test]
    fn test_missing_padding_accepted() {
        let codec = TokenCodec::new();
        let token = codec.encode(&sample_record());
        let unpadded = token.trim_end_matches('=');
        assert_eq!(codec.decode(unpadded).unwrap(), sample_record());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{"iv":"IiIiIiIiIiIiIiIi","encrypted":"MzMzMzMzMzMzMzMzMzMzMzMzMzMzMzMzMzMz","iterations":100000,"salt":"EREREREREREREREREREREQ==","note":"hi"}"#;
        assert_eq!(TokenCodec::new().decode(&wrap(json)).unwrap(), sample_record());
    }

    #[test]
    fn test_garbage_rejected() {
        let codec = TokenCodec::new();
        assert_malformed(codec.decode("not a token $$$"));
        assert_malformed(codec.decode(""));
        assert_malformed(codec.decode("{"));
    }

    #[test]
    fn test_base64_of_non_json_rejected() {
        assert_malformed(TokenCodec::new().decode(&wrap("hello world")));
    }

    #[test]
    fn test_base64_of_non_object_rejected() {
        let codec = TokenCodec::new();
        assert_malformed(codec.decode(&wrap("[1,2,3]")));
        assert_malformed(codec.decode(&wrap("42")));
        assert_malformed(codec.decode(&wrap("null")));
    }

    #[test]
    fn test_base64_of_non_utf8_rejected() {
        assert_malformed(TokenCodec::new().decode(&STANDARD.encode([0xff, 0xfe, 0xfd])));
    }

    #[test]
    fn test_missing_fields_rejected() {
        let codec = TokenCodec::new();
        for field in ["iv", "encrypted", "iterations", "salt"] {
            let mut value: Value = serde_json::from_str(&to_json(&sample_record())).unwrap();
            value.as_object_mut().unwrap().remove(field);
            let json = value.to_string();

            let err = codec.decode(&wrap(&json)).expect_err("expected rejection");
            assert_eq!(err.kind, Some(ErrorKind::MalformedToken));
            assert!(err.message().contains(field), "{}", err.message());

            assert_malformed(codec.decode(&json));
        }
    }

    #[test]
    fn test_wrong_types_rejected() {
        let codec = TokenCodec::new();
        let cases = [
            r#"{"iv":12,"encrypted":"MzMz","iterations":1,"salt":"EREREREREREREREREREREQ=="}"#,
            r#"{"iv":"IiIiIiIiIiIiIiIi","encrypted":null,"iterations":1,"salt":"EREREREREREREREREREREQ=="}"#,
            r#"{"iv":"IiIiIiIiIiIiIiIi","encrypted":"MzMz","iterations":"100000","salt":"EREREREREREREREREREREQ=="}"#,
            r#"{"iv":"IiIiIiIiIiIiIiIi","encrypted":"MzMz","iterations":1,"salt":["a"]}"#,
        ];
        for json in cases {
            assert_malformed(codec.decode(&wrap(json)));
            assert_malformed(codec.decode(json));
        }
    }

    #[test]
    fn test_bad_field_base64_rejected() {
        let json = r#"{"iv":"IiIiIiIiIiIiIiIi","encrypted":"not$base64","iterations":1,"salt":"EREREREREREREREREREREQ=="}"#;
        let err = TokenCodec::new()
            .decode(&wrap(json))
            .expect_err("expected rejection");
        assert_eq!(err.kind, Some(ErrorKind::MalformedToken));
        assert!(err.message().contains("encrypted"));
    }

    #[test]
    fn test_iterations_must_be_positive_integer() {
        let codec = TokenCodec::new();
        for iterations in ["0", "-1", "1.5", "1e5", "4294967296"] {
            let json = format!(
                r#"{{"iv":"IiIiIiIiIiIiIiIi","encrypted":"MzMz","iterations":{},"salt":"EREREREREREREREREREREQ=="}}"#,
                iterations
            );
            assert_malformed(codec.decode(&wrap(&json)));
            assert_malformed(codec.decode(&json));
        }
    }

    #[test]
    fn test_iterations_cap() {
        let json = r#"{"iv":"IiIiIiIiIiIiIiIi","encrypted":"MzMz","iterations":2000,"salt":"EREREREREREREREREREREQ=="}"#;

        assert_malformed(TokenCodec::with_max_iterations(1_999).decode(&wrap(json)));
        let record = TokenCodec::with_max_iterations(2_000)
            .decode(&wrap(json))
            .unwrap();
        assert_eq!(record.iterations(), 2_000);
    }

    #[test]
    fn test_default_cap_rejects_huge_work_factor() {
        let json = r#"{"iv":"IiIiIiIiIiIiIiIi","encrypted":"MzMz","iterations":4000000000,"salt":"EREREREREREREREREREREQ=="}"#;
        assert_malformed(TokenCodec::new().decode(&wrap(json)));
    }

    #[test]
    fn test_wrong_lengths_rejected() {
        let codec = TokenCodec::new();
        // 8-byte salt
        let short_salt = r#"{"iv":"IiIiIiIiIiIiIiIi","encrypted":"MzMz","iterations":1,"salt":"ERERERERERE="}"#;
        // 16-byte iv
        let long_iv = r#"{"iv":"IiIiIiIiIiIiIiIiIiIiIg==","encrypted":"MzMz","iterations":1,"salt":"EREREREREREREREREREREQ=="}"#;

        assert_malformed(codec.decode(&wrap(short_salt)));
        assert_malformed(codec.decode(&wrap(long_iv)));
    }

    #[test]
    fn test_error_reports_legacy_stage_for_json_input() {
        let json = r#"{"iv":"IiIiIiIiIiIiIiIi","encrypted":"MzMz","salt":"EREREREREREREREREREREQ=="}"#;
        let err = TokenCodec::new().decode(json).expect_err("expected rejection");
        assert!(err.message().contains("iterations"), "{}", err.message());
    }

    #[test]
    fn test_error_reports_canonical_stage_for_other_input() {
        let err = TokenCodec::new()
            .decode("!!!")
            .expect_err("expected rejection");
        assert!(err.message().contains("base64"), "{}", err.message());
    }
}
