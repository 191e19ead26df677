use contrax_core::{MESSAGE_KEYS, ValidationErrors};
use contrax_store::StoreError;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("could not reach server: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("not authorized: {message}")]
    Unauthorized { message: String },

    #[error("session expired")]
    SessionExpired,

    #[error("validation failed ({status}): {errors}")]
    Validation { status: u16, errors: ValidationErrors },

    #[error("server returned {status}: {}", describe(.detail, .body))]
    Server {
        status: u16,
        detail: Option<String>,
        body: String,
    },

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("invalid input: {0}")]
    Invalid(ValidationErrors),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn describe(detail: &Option<String>, body: &str) -> String {
    match detail {
        Some(d) => d.clone(),
        None if body.is_empty() => "(empty body)".to_string(),
        None => body.chars().take(200).collect(),
    }
}

impl ApiError {
    /// Classify a non-2xx response.
    pub fn from_response(status: u16, body: String) -> Self {
        let json: Option<Value> = serde_json::from_str(&body).ok();
        let detail = json.as_ref().and_then(detail_message);
        match status {
            401 => Self::Unauthorized {
                message: detail.unwrap_or_else(|| "authentication required".to_string()),
            },
            400 | 422 => match json.as_ref().and_then(ValidationErrors::from_drf) {
                Some(errors) => Self::Validation { status, errors },
                None => Self::Server {
                    status,
                    detail,
                    body,
                },
            },
            _ => Self::Server {
                status,
                detail,
                body,
            },
        }
    }

    /// HTTP status, when the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } | Self::SessionExpired => Some(401),
            Self::Validation { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) | Self::Invalid(_) | Self::Store(_) => None,
        }
    }

    /// The backend answered and refused the request (4xx).
    pub fn is_rejection(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    /// Worth retrying an idempotent read: the server was unreachable or
    /// answered with a gateway/server failure.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Server { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// Text for a user-facing notification: the backend's own message when
    /// it sent one, a generic one otherwise.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(_) => "Could not reach the server".to_string(),
            Self::Unauthorized { message } => message.clone(),
            Self::SessionExpired => "Session expired. Please log in again.".to_string(),
            Self::Validation { errors, .. } | Self::Invalid(errors) => errors.to_string(),
            Self::Server { status, detail, .. } => detail
                .clone()
                .unwrap_or_else(|| format!("Request failed with status {status}")),
            Self::Decode(_) => "Unexpected response from the server".to_string(),
            Self::Store(_) => "Could not access stored credentials".to_string(),
        }
    }
}

/// First string among `detail`, `message`, `error` in a JSON error body.
pub fn detail_message(body: &Value) -> Option<String> {
    MESSAGE_KEYS
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}
