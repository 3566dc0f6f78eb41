use thiserror::Error;

use super::Phase;
use crate::backend::{BackendError, BackendId};
use crate::profile::ProfileError;

/// Fatal negotiation failures. Anything returned here aborted the run
/// before a report was produced.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("no backend credential available for {agent}")]
    NoProviderAvailable { agent: String },

    #[error("{phase} call for {agent} failed: {source}")]
    Backend {
        phase: Phase,
        agent: String,
        #[source]
        source: BackendError,
    },

    #[error("backend {0} has no registered transport")]
    UnknownBackend(BackendId),

    #[error("rounds must be at least 1 (got {0})")]
    InvalidRounds(u32),
}

impl NegotiationError {
    pub fn diagnosis(&self) -> &'static str {
        match self {
            Self::Profile(e) => e.diagnosis(),
            Self::NoProviderAvailable { .. } => "set an API key for at least one backend",
            Self::Backend { source, .. } => source.diagnosis(),
            Self::UnknownBackend(_) => "transport configuration",
            Self::InvalidRounds(_) => "fix the rounds setting",
        }
    }

    /// The backend involved, when there is one.
    pub fn backend(&self) -> Option<BackendId> {
        match self {
            Self::Backend { source, .. } => Some(source.backend()),
            Self::UnknownBackend(backend) => Some(*backend),
            _ => None,
        }
    }

    /// HTTP status of the failing call, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend { source, .. } => source.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_exposes_status_and_hint() {
        let err = NegotiationError::Backend {
            phase: Phase::Round(2),
            agent: "Roux".into(),
            source: BackendError::from_status(BackendId::Google, 401, "bad key"),
        };
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.backend(), Some(BackendId::Google));
        assert_eq!(err.diagnosis(), "check credentials");
        let msg = err.to_string();
        assert!(msg.contains("round 2"));
        assert!(msg.contains("Roux"));
    }

    #[test]
    fn profile_errors_pass_through() {
        let err: NegotiationError = ProfileError::NotFound { id: "x".into() }.into();
        assert_eq!(err.to_string(), "profile \"x\" not found");
        assert!(err.backend().is_none());
    }
}
