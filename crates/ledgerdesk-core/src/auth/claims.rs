//! Decoding of the claims payload embedded in a bearer token.
//!
//! Only the payload is read. The signature is never checked here.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// base64url, tolerant of both padded and unpadded input
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Token has no claims segment")]
    MalformedToken,

    #[error("Claims segment is not valid base64url: {0}")]
    InvalidEncoding(String),

    #[error("Claims payload is not a JSON object: {0}")]
    InvalidPayload(String),

    #[error("Claims payload has no usable exp claim")]
    MissingExpiry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    pub expires_at: DateTime<Utc>,
    pub subject: Option<String>,
    pub email: Option<String>,
    /// Everything else in the payload
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Time left before expiry. Negative once the token has expired.
    pub fn time_to_live(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Decode the claims of a `header.payload.signature` token.
pub fn decode_claims(token: &str) -> Result<Claims, DecodeError> {
    let payload = token
        .trim()
        .split('.')
        .nth(1)
        .ok_or(DecodeError::MalformedToken)?;

    // Accept the standard alphabet too
    let normalized: String = payload
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    let bytes = PAYLOAD_ENGINE
        .decode(normalized.as_bytes())
        .map_err(|e| DecodeError::InvalidEncoding(e.to_string()))?;

    let mut object = match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(object)) => object,
        Ok(other) => {
            return Err(DecodeError::InvalidPayload(format!(
                "expected object, found {}",
                json_kind(&other)
            )))
        }
        Err(e) => return Err(DecodeError::InvalidPayload(e.to_string())),
    };

    let exp = object
        .remove("exp")
        .as_ref()
        .and_then(Value::as_f64)
        .filter(|exp| exp.is_finite() && *exp > 0.0)
        .ok_or(DecodeError::MissingExpiry)?;
    let expires_at = Utc
        .timestamp_millis_opt((exp * 1000.0).round() as i64)
        .single()
        .ok_or_else(|| DecodeError::InvalidPayload(format!("exp out of range: {}", exp)))?;

    let subject = take_string(&mut object, "sub");
    let email = take_string(&mut object, "email");

    Ok(Claims {
        expires_at,
        subject,
        email,
        extra: object,
    })
}

fn take_string(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key) {
        Some(Value::String(s)) => Some(s),
        Some(other) => {
            // Keep non-string values around rather than losing them
            object.insert(key.to_string(), other);
            None
        }
        None => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Build an unsigned token around the given payload. Test helper.
#[cfg(test)]
pub(crate) fn token_with_payload(payload: &Value) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, body)
}

/// Build an unsigned token expiring at `exp` (seconds since epoch). Test helper.
#[cfg(test)]
pub(crate) fn token_expiring_at(exp: f64) -> String {
    token_with_payload(&serde_json::json!({ "sub": "42", "exp": exp }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use serde_json::json;

    #[test]
    fn test_decode_valid_token() {
        let token = token_with_payload(&json!({
            "sub": "7",
            "email": "admin@example.com",
            "exp": 1_900_000_000,
            "role": "admin"
        }));

        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.expires_at.timestamp(), 1_900_000_000);
        assert_eq!(claims.subject.as_deref(), Some("7"));
        assert_eq!(claims.email.as_deref(), Some("admin@example.com"));
        assert_eq!(claims.extra.get("role"), Some(&json!("admin")));
    }

    #[test]
    fn test_fractional_exp_keeps_milliseconds() {
        let claims = decode_claims(&token_expiring_at(1_900_000_000.25)).unwrap();
        assert_eq!(claims.expires_at.timestamp_millis(), 1_900_000_000_250);
    }

    #[test]
    fn test_two_segments_are_enough() {
        let body = URL_SAFE_NO_PAD.encode(r#"{"exp":1900000000}"#);
        assert!(decode_claims(&format!("header.{}", body)).is_ok());
    }

    #[test]
    fn test_padded_and_standard_alphabet_payloads() {
        // "?>" encodes with '+' in the standard alphabet, and this length needs padding
        let payload = r#"{"exp":1900000000,"note":"??>>"}"#;
        let standard = STANDARD.encode(payload);
        assert!(standard.contains('/') || standard.contains('+') || standard.ends_with('='));
        assert!(decode_claims(&format!("h.{}.s", standard)).is_ok());
    }

    #[test]
    fn test_fewer_than_two_segments() {
        assert_eq!(decode_claims(""), Err(DecodeError::MalformedToken));
        assert_eq!(decode_claims("opaque-token"), Err(DecodeError::MalformedToken));
    }

    #[test]
    fn test_non_base64_payload() {
        assert!(matches!(
            decode_claims("header.!!!not-base64!!!.sig"),
            Err(DecodeError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_non_json_payload() {
        let body = URL_SAFE_NO_PAD.encode("plain text");
        assert!(matches!(
            decode_claims(&format!("h.{}.s", body)),
            Err(DecodeError::InvalidPayload(_))
        ));

        let array = URL_SAFE_NO_PAD.encode("[1,2,3]");
        assert!(matches!(
            decode_claims(&format!("h.{}.s", array)),
            Err(DecodeError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_missing_or_unusable_exp() {
        for payload in [
            json!({ "sub": "1" }),
            json!({ "exp": 0 }),
            json!({ "exp": -5 }),
            json!({ "exp": "1900000000" }),
            json!({ "exp": null }),
        ] {
            assert_eq!(
                decode_claims(&token_with_payload(&payload)),
                Err(DecodeError::MissingExpiry),
                "payload {} should be rejected",
                payload
            );
        }
    }

    #[test]
    fn test_exp_beyond_representable_dates() {
        for exp in [1.0e13, 1.0e300] {
            let result = decode_claims(&token_expiring_at(exp));
            assert!(
                matches!(result, Err(DecodeError::InvalidPayload(ref m)) if m.contains("out of range")),
                "exp {} gave {:?}",
                exp,
                result
            );
        }
    }

    #[test]
    fn test_time_to_live() {
        let claims = decode_claims(&token_expiring_at(1_900_000_030.0)).unwrap();
        let now = Utc.timestamp_opt(1_900_000_000, 0).unwrap();
        assert_eq!(claims.time_to_live(now), Duration::seconds(30));
        assert!(!claims.is_expired(now));
        assert!(claims.is_expired(now + Duration::seconds(30)));
    }
}
