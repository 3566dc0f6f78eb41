use std::time::Duration;

use thiserror::Error;

use super::types::BackendId;

/// Error bodies are cut to this many characters before being stored.
pub const MAX_ERROR_BODY_CHARS: usize = 1024;

/// Failure of a single backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend rejected the credential (401/403).
    #[error("{backend} rejected the credential (HTTP {status}): {body}")]
    Auth {
        backend: BackendId,
        status: u16,
        body: String,
    },

    /// HTTP 429.
    #[error("{backend} rate limited the request (HTTP 429): {body}")]
    RateLimited { backend: BackendId, body: String },

    /// Any other non-success HTTP status.
    #[error("{backend} returned HTTP {status}: {body}")]
    Http {
        backend: BackendId,
        status: u16,
        body: String,
    },

    /// The response parsed but carried no text.
    #[error("{backend} returned no text content")]
    EmptyResponse { backend: BackendId },

    #[error("{backend} did not answer within {}s", .timeout.as_secs())]
    Timeout {
        backend: BackendId,
        timeout: Duration,
    },

    /// Connection, DNS, TLS or subprocess failure.
    #[error("transport failure talking to {backend}: {message}")]
    Transport { backend: BackendId, message: String },

    /// The response body was not the JSON shape the backend documents.
    #[error("malformed response from {backend}: {message}")]
    Malformed { backend: BackendId, message: String },

    #[error("no transport registered for backend {0}")]
    Unregistered(BackendId),
}

impl BackendError {
    /// Classify a non-success HTTP status into the matching variant.
    pub fn from_status(backend: BackendId, status: u16, body: &str) -> Self {
        let body = truncate_body(body);
        match status {
            401 | 403 => Self::Auth {
                backend,
                status,
                body,
            },
            429 => Self::RateLimited { backend, body },
            _ => Self::Http {
                backend,
                status,
                body,
            },
        }
    }

    pub fn backend(&self) -> BackendId {
        match self {
            Self::Auth { backend, .. }
            | Self::RateLimited { backend, .. }
            | Self::Http { backend, .. }
            | Self::EmptyResponse { backend }
            | Self::Timeout { backend, .. }
            | Self::Transport { backend, .. }
            | Self::Malformed { backend, .. } => *backend,
            Self::Unregistered(backend) => *backend,
        }
    }

    /// HTTP status, when the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } | Self::Http { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// One-line operator hint telling credential trouble apart from outages.
    pub fn diagnosis(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "check credentials",
            Self::RateLimited { .. } => "backend rate limit; wait and retry",
            Self::Http { status, .. } if *status >= 500 => "backend outage",
            Self::Http { .. } => "request rejected; prompt or parser bug",
            Self::EmptyResponse { .. } | Self::Malformed { .. } => "prompt or parser bug",
            Self::Timeout { .. } | Self::Transport { .. } => "backend outage or network problem",
            Self::Unregistered(_) => "transport configuration",
        }
    }
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    cut.push_str("...");
    cut
}
