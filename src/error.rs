//! Error types for upstream calls and console operations.

use std::time::Duration;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

use crate::domain::{CandidateId, HintId};

/// Failures talking to the upstream hint-evaluation service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("no response within {after:?}")]
    Timeout { after: Duration },
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ServiceError::Decode(e.to_string())
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("{action} failed: {source}")]
    Service {
        action: &'static str,
        #[source]
        source: ServiceError,
    },

    #[error("another long-running operation is in progress")]
    Busy,

    #[error("session reconciliation already in progress")]
    AlreadyReconciling,

    #[error("no active question; generate or load one first")]
    NoActiveQuestion,

    #[error("unknown hint {0}")]
    UnknownHint(HintId),

    #[error("unknown candidate {0}")]
    UnknownCandidate(CandidateId),

    #[error("unknown preset: {0}")]
    UnknownPreset(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("hint {hint} is already being evaluated")]
    BatchConflict { hint: HintId },

    #[error("snapshot cache: {0}")]
    Persistence(String),
}

impl ConsoleError {
    /// Attach the name of the user-facing action to an upstream failure.
    pub fn service(action: &'static str) -> impl FnOnce(ServiceError) -> ConsoleError {
        move |source| ConsoleError::Service { action, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ConsoleError::Service { source: ServiceError::Timeout { .. }, .. } => StatusCode::GATEWAY_TIMEOUT,
            ConsoleError::Service { .. } => StatusCode::BAD_GATEWAY,
            ConsoleError::Busy | ConsoleError::AlreadyReconciling | ConsoleError::BatchConflict { .. } => {
                StatusCode::CONFLICT
            }
            ConsoleError::NoActiveQuestion | ConsoleError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ConsoleError::UnknownHint(_) | ConsoleError::UnknownCandidate(_) | ConsoleError::UnknownPreset(_) => {
                StatusCode::NOT_FOUND
            }
            ConsoleError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ConsoleError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ConsoleResult<T> = std::result::Result<T, ConsoleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failed_action() {
        let e = ConsoleError::service("save candidate")(ServiceError::Status { status: 400, body: "bad".into() });
        assert_eq!(e.to_string(), "save candidate failed: HTTP 400: bad");
        assert_eq!(e.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn timeouts_map_to_gateway_timeout() {
        let e = ConsoleError::service("generate")(ServiceError::Timeout { after: Duration::from_secs(1) });
        assert_eq!(e.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ConsoleError::Busy.status(), StatusCode::CONFLICT);
    }
}
