use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Request rejected: {0}")]
    BadRequest(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - session expired or revoked")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull a readable message out of an error body.
    ///
    /// Handles ASP.NET validation problems (`errors` map of field to messages),
    /// then `message`, then `title`; anything else is returned as raw text.
    pub fn summarize_body(body: &str) -> String {
        let Ok(value) = serde_json::from_str::<Value>(body) else {
            return Self::truncate_body(body.trim());
        };

        if let Some(errors) = value.get("errors").and_then(Value::as_object) {
            let messages: Vec<&str> = errors
                .values()
                .flat_map(|v| match v {
                    Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                    Value::String(s) => vec![s.as_str()],
                    _ => Vec::new(),
                })
                .collect();
            if !messages.is_empty() {
                return Self::truncate_body(&messages.join(", "));
            }
        }

        for field in ["message", "title"] {
            if let Some(text) = value.get(field).and_then(Value::as_str) {
                if !text.is_empty() {
                    return Self::truncate_body(text);
                }
            }
        }

        match value {
            Value::String(text) => Self::truncate_body(&text),
            _ => Self::truncate_body(body.trim()),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let summary = Self::summarize_body(body);
        match status.as_u16() {
            400 | 409 | 422 => ApiError::BadRequest(summary),
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(summary),
            404 => ApiError::NotFound(summary),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(summary),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, summary)),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}
