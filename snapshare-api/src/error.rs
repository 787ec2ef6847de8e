use serde_json::Value;

use crate::MAX_COMMENT_CHARS;

#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("comment is empty")]
    Empty,

    #[error("comment is longer than {} characters", MAX_COMMENT_CHARS)]
    TooLong,

    #[error("comment is not confirmed by the server yet")]
    Unconfirmed,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Invalid comment: {0}")]
    Validation(#[from] ValidationError),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request failed with status {status}: {message}")]
    Http { status: u16, message: String },
}

impl Error {
    /// Builds the error for a non-2xx answer, extracting a message from its body
    pub fn from_response(status: u16, reason: Option<&str>, body: &[u8]) -> Error {
        let message = error_message(body)
            .or_else(|| reason.map(String::from))
            .unwrap_or_else(|| format!("HTTP {status}"));
        Error::Http { status, message }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message meant to be displayed to the user as-is
    pub fn user_message(&self) -> String {
        match self {
            Error::Http { message, .. } => message.clone(),
            e => e.to_string(),
        }
    }
}

const MESSAGE_FIELDS: [&str; 3] = ["detail", "message", "error"];

/// Extracts a human-readable message out of whatever error envelope the backend returned
pub fn error_message(body: &[u8]) -> Option<String> {
    match serde_json::from_slice::<Value>(body) {
        Ok(v) => message_of(&v),
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            let text = text.trim();
            (!text.is_empty()).then(|| String::from(text))
        }
    }
}

fn message_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let parts = items.iter().filter_map(message_of).collect::<Vec<_>>();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        Value::Object(o) => MESSAGE_FIELDS
            .iter()
            .chain(std::iter::once(&"msg"))
            .find_map(|f| o.get(*f).and_then(message_of)),
        _ => None,
    }
}
