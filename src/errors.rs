use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";

/// Field names checked, in order, when a response carries per-field errors.
const FIELD_PRIORITY: &[&str] = &[
    "email",
    "password",
    "username",
    "first_name",
    "last_name",
    "password_confirm",
    "current_password",
    "new_password",
    "new_password_confirm",
    "files",
    "non_field_errors",
];

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{message}")]
    Validation { field: Option<String>, message: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("{}", SESSION_EXPIRED_MESSAGE)]
    SessionExpired,

    /// The session was replaced or cleared while a refresh was in flight.
    #[error("Session changed during token refresh")]
    SessionChanged,

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Upload timed out after {0:?}")]
    UploadTimeout(Duration),

    #[error("Upload cancelled")]
    Cancelled,

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("Payment error: {0}")]
    Payment(String),

    #[error("API request failed with status {status}: {message}")]
    Api {
        status: StatusCode,
        message: String,
        field: Option<String>,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    #[error("Incorrect password. Please try again.")]
    WrongPassword,

    #[error("This file has expired and is no longer available.")]
    Expired,

    #[error("File not found. The link may be invalid or the file may have been removed.")]
    NotFound,
}

impl ClientError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ClientError::Validation {
            field: Some(field.to_string()),
            message: message.into(),
        }
    }

    /// Builds an error from a non-success response body, preferring field-level messages.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        match parsed.as_ref().and_then(extract_message) {
            Some((field, message)) => ClientError::Api {
                status,
                message,
                field,
            },
            None => ClientError::Api {
                status,
                message: status_message(status).to_string(),
                field: None,
            },
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    /// Whether a fresh user-initiated attempt can succeed without changing anything else.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Download(e) => matches!(e, DownloadError::WrongPassword),
            ClientError::Upload(_)
            | ClientError::UploadTimeout(_)
            | ClientError::Cancelled
            | ClientError::Http(_)
            | ClientError::Io(_) => true,
            ClientError::Api { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    /// Text suitable for rendering directly next to the failed action.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation { message, .. } => message.clone(),
            ClientError::Auth(msg) | ClientError::Upload(msg) | ClientError::Payment(msg) => {
                msg.clone()
            }
            ClientError::Api { message, .. } => message.clone(),
            ClientError::Http(e) if e.is_timeout() => {
                "The request timed out. Please try again.".to_string()
            }
            ClientError::Http(e) if e.is_connect() || e.is_request() => {
                "Network error. Please check your connection and try again.".to_string()
            }
            ClientError::Http(e) => match e.status() {
                Some(status) => status_message(status).to_string(),
                None => "Network error. Please check your connection and try again.".to_string(),
            },
            ClientError::Json(_) => "Invalid response from server".to_string(),
            ClientError::Token(_) => SESSION_EXPIRED_MESSAGE.to_string(),
            ClientError::Io(e) => format!("Could not read file: {}", e),
            ClientError::Internal(_) => "An unexpected error occurred.".to_string(),
            other => other.to_string(),
        }
    }

    /// The form field this error belongs to, if the server or validator named one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ClientError::Validation { field, .. } | ClientError::Api { field, .. } => {
                field.as_deref()
            }
            _ => None,
        }
    }
}

fn first_message(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_message),
        _ => None,
    }
}

fn field_message(map: &serde_json::Map<String, Value>) -> Option<(Option<String>, String)> {
    for field in FIELD_PRIORITY {
        if let Some(message) = map.get(*field).and_then(first_message) {
            let field = (*field != "non_field_errors").then(|| field.to_string());
            return Some((field, message));
        }
    }
    None
}

fn extract_message(body: &Value) -> Option<(Option<String>, String)> {
    let map = body.as_object()?;

    if let Some(errors) = map.get("errors").and_then(Value::as_object) {
        if let Some(found) = field_message(errors) {
            return Some(found);
        }
    }

    if let Some(found) = field_message(map) {
        return Some(found);
    }

    ["detail", "message", "error"]
        .iter()
        .find_map(|key| map.get(*key).and_then(first_message))
        .map(|message| (None, message))
}

pub fn status_message(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "Invalid request. Please check your input.",
        401 => "Authentication failed. Please log in again.",
        403 => "Access denied. You don't have permission to perform this action.",
        404 => "The requested resource was not found.",
        429 => "Too many requests. Please wait a moment and try again.",
        500 => "Server error. Please try again later.",
        502..=504 => "Service temporarily unavailable. Please try again later.",
        _ => "Request failed. Please try again.",
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
