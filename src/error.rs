//! Error types for remote-state.

use thiserror::Error;

/// Main error type for remote-state operations.
#[derive(Error, Debug)]
pub enum RemoteStateError {
    /// No session record exists for the given id.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// The session roster has no host participant. Implies a corrupted
    /// record and is never produced by a well-formed verb sequence.
    #[error("session {0} has no host participant")]
    NoHostBound(String),

    /// A host-only verb arrived from a connection that is not the
    /// host's current binding.
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    /// Accept/decline referenced an id absent from the pending queue.
    #[error("participant {0} is not pending approval")]
    UnknownPendingParticipant(String),

    /// Rejoin presented a prior connection id that does not match the
    /// stored binding.
    #[error("identity mismatch for participant {0}")]
    IdentityMismatch(String),

    /// Notify/rejoin referenced a participant not in the roster or not
    /// bound to the calling connection.
    #[error("unknown participant: {0}")]
    UnknownParticipant(String),

    /// Payload shape was rejected before reaching the verb logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// Session store get/set failure.
    #[error("store error: {0}")]
    Store(String),

    /// Serialization of a session record or protocol event failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal channel was closed.
    #[error("channel closed")]
    ChannelClosed,

    /// Client transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteStateError {
    /// Stable wire code reported to clients in error events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownSession(_) => "UNKNOWN_SESSION",
            Self::NoHostBound(_) => "NO_HOST_BOUND",
            Self::AuthorizationDenied(_) => "AUTHORIZATION_DENIED",
            Self::UnknownPendingParticipant(_) => "UNKNOWN_PENDING_PARTICIPANT",
            Self::IdentityMismatch(_) => "IDENTITY_MISMATCH",
            Self::UnknownParticipant(_) => "UNKNOWN_PARTICIPANT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Store(_) => "STORE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::ChannelClosed => "CHANNEL_CLOSED",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

/// Convenience Result type for remote-state operations.
pub type Result<T> = std::result::Result<T, RemoteStateError>;
