use crate::http::HttpMethod;
use thiserror::Error;

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The service answered with a non-2xx status.
    #[error("{method} {url} failed: status={code} body={}", truncate_error_body(.body))]
    Status {
        method: HttpMethod,
        url: String,
        code: u16,
        body: String,
    },
    /// No HTTP status was received (connect failure, reset, client timeout).
    #[error("{method} {url} transport error: {message}")]
    Network {
        method: HttpMethod,
        url: String,
        message: String,
    },
    #[error("invalid request {url}: {message}")]
    InvalidRequest { url: String, message: String },
    /// A 2xx response whose payload could not be decoded.
    #[error("{url} returned an invalid payload: {message}")]
    InvalidResponse { url: String, message: String },
}

impl TransportError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, TransportError::Network { .. })
    }
}

pub fn truncate_error_body(raw: &str) -> String {
    let normalized = raw.replace('\n', " ");
    if normalized.chars().count() <= MAX_ERROR_BODY_CHARS {
        return normalized;
    }
    normalized.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
