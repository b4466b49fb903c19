//! Error taxonomy shared by the server and the client.
//!
//! Two channels are kept apart on purpose:
//! - [`ServiceError`]: what a business operation answers (embedded in a
//!   response payload when it travels through an endpoint).
//! - [`EndpointError`]: the call itself did not complete (transport,
//!   decoding, discovery, budget, cancellation).

use std::time::Duration;

/// Message used on the wire for [`ServiceError::NotFound`].
pub const MSG_NOT_FOUND: &str = "not found";
/// Message used on the wire for [`ServiceError::AlreadyExists`].
pub const MSG_ALREADY_EXISTS: &str = "already exists";
/// Message used on the wire for [`ServiceError::InconsistentIds`].
pub const MSG_INCONSISTENT_IDS: &str = "inconsistent IDs";
/// Message used on the wire for [`ServiceError::BadRouting`].
pub const MSG_BAD_ROUTING: &str =
    "inconsistent mapping between route and handler (programming error)";

/// Outcome of a `NoteService` operation that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("inconsistent IDs")]
    InconsistentIds,
    /// Route registration and handler disagree. Never expected in a correct
    /// deployment.
    #[error("inconsistent mapping between route and handler (programming error)")]
    BadRouting,
    /// An error message returned by a remote server that does not map onto
    /// the known taxonomy.
    #[error("{0}")]
    Remote(String),
    /// The call never produced a business answer.
    #[error("service unavailable: {0}")]
    Unavailable(#[from] EndpointError),
}

impl ServiceError {
    /// Rebuilds a `ServiceError` from the `error` field of a wire error body.
    #[must_use]
    pub fn from_message(message: &str) -> Self {
        match message {
            MSG_NOT_FOUND => Self::NotFound,
            MSG_ALREADY_EXISTS => Self::AlreadyExists,
            MSG_INCONSISTENT_IDS => Self::InconsistentIds,
            MSG_BAD_ROUTING => Self::BadRouting,
            other => Self::Remote(other.to_string()),
        }
    }

    /// Returns `true` for domain outcomes that a retry cannot change.
    #[must_use]
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::AlreadyExists | Self::InconsistentIds
        )
    }
}

/// Call-level failure: the request did not produce a decodable response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("no endpoints available")]
    NoEndpoints,
    #[error("call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("call canceled")]
    Canceled,
    #[error("retry exhausted after {attempts} attempt(s): {last}")]
    RetryExhausted {
        attempts: usize,
        last: Box<EndpointError>,
    },
}

impl EndpointError {
    /// Whether another attempt against a freshly selected endpoint may help.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Decode(_) | Self::NoEndpoints | Self::Timeout(_)
        )
    }
}
