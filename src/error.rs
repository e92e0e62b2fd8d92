//! Closed error taxonomy for the orchestration core (spec §7).
//!
//! `AgentError` is the only error type that crosses a component boundary.
//! Internal plumbing errors (serde, io) are translated into it before they
//! can escape; nothing downstream ever sees a raw `anyhow::Error` or panic.

use serde::{Deserialize, Serialize};

/// The closed taxonomy from spec §7. Kept flat (no nested enums) so it can be
/// serialized directly onto an `Event::Error` and matched exhaustively by the
/// orchestrator's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    PlanInvalid,
    ToolNotFound,
    ToolNotPermitted,
    ToolRateLimited,
    ToolTimeout,
    ToolFailed,
    McpUnavailable,
    LlmFailed,
    LlmRateLimited,
    MemoryDegraded,
    CredentialDecryptFailed,
    ContextDenied,
    RequestTimeout,
    RequestCancelled,
    Internal,
}

/// How an `ErrorKind` should be handled by the orchestrator, per spec §7's
/// propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    RecoveredLocally,
    TriggersReplan,
    SurfacedToUser,
    LoggedDegrading,
}

impl ErrorKind {
    pub fn propagation(self) -> Propagation {
        use ErrorKind::*;
        match self {
            ToolTimeout | ToolFailed | ToolRateLimited | LlmRateLimited => {
                Propagation::RecoveredLocally
            }
            ToolNotFound | PlanInvalid => Propagation::TriggersReplan,
            ContextDenied
            | ToolNotPermitted
            | CredentialDecryptFailed
            | RequestTimeout
            | RequestCancelled
            | LlmFailed
            | McpUnavailable
            | Internal => Propagation::SurfacedToUser,
            MemoryDegraded => Propagation::LoggedDegrading,
        }
    }

    pub fn retryable(self) -> bool {
        matches!(self.propagation(), Propagation::RecoveredLocally)
    }

    /// Short remediation hint shown alongside the message for errors that
    /// need one (credential re-entry, expired permissions). No internal
    /// detail leaks through this.
    pub fn remediation_hint(self) -> Option<&'static str> {
        match self {
            ErrorKind::CredentialDecryptFailed => Some("credential may need re-entry"),
            ErrorKind::ToolNotPermitted => {
                Some("ask a workspace admin to grant this tool permission")
            }
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("{kind:?}: {message}")]
    Orchestration { kind: ErrorKind, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        AgentError::Orchestration {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Orchestration { kind, .. } => *kind,
            AgentError::NotFound(_) => ErrorKind::Internal,
            AgentError::InvalidConfiguration(_) => ErrorKind::Internal,
            AgentError::Serde(_) => ErrorKind::Internal,
            AgentError::Io(_) => ErrorKind::Internal,
            AgentError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// User-facing message: never a path, stack trace, or credential value.
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Orchestration { message, .. } => message.clone(),
            AgentError::NotFound(what) => format!("not found: {what}"),
            _ => "an internal error occurred".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
