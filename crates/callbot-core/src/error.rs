//! Error types for the call-lifecycle engine.
//!
//! Errors are grouped the way spec.md's error-handling design groups them:
//! fatal startup errors that abort `Agent::start`, per-call errors that are
//! logged and surfaced as events, and collaborator errors that drop the
//! current segment without tearing down the call.

use thiserror::Error;

/// Result type alias used throughout this crate.
pub type AgentResult<T> = Result<T, AgentError>;

/// All error kinds named in spec.md §7.
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    /// Configuration failed validation. Fatal at startup.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The SIP/media library failed to initialize. Fatal, aborts `start`.
    #[error("library init failed: {0}")]
    LibraryInitFailed(String),

    /// Transport (UDP) creation failed. Fatal.
    #[error("transport failed: {0}")]
    TransportFailed(String),

    /// A referenced file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// A byte range was invalid (start >= file size, or start >= end).
    #[error("invalid byte range: {0}")]
    InvalidRange(String),

    /// The call is not in the confirmed media state.
    #[error("call not ready: {0}")]
    CallNotReady(String),

    /// The call has no active audio media to attach to.
    #[error("no active media for call: {0}")]
    NoActiveMedia(String),

    /// A transcription, language-model or TTS collaborator call failed.
    #[error("collaborator failed: {0}")]
    CollaboratorFailed(String),

    /// The command queue's agent has stopped; submission was rejected.
    #[error("command queue closed")]
    QueueClosed,

    /// An operation did not complete within its allotted time.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl AgentError {
    /// Fatal errors abort `Agent::start` and leave no thread behind.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::ConfigInvalid(_)
                | AgentError::LibraryInitFailed(_)
                | AgentError::TransportFailed(_)
        )
    }

    /// Per-call and collaborator errors the caller can reasonably retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AgentError::CollaboratorFailed(_) | AgentError::Timeout(_)
        )
    }
}
