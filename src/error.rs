//! Error types for frame-broker
//!
//! Transport-facing errors carry an HTTP status via [`Error::status_code`].
//! Pipeline-internal errors (`SourceDisconnected`, `InferenceFailed`) are
//! absorbed by the pipeline and only ever show up in logs and stats.

use http::StatusCode;

use crate::registry::RegistryError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed publish (empty payload, zero dimensions, bad content type)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Fetch on an unknown channel
    #[error("Channel not found: {0}")]
    NotFound(String),

    /// Channel exists but nothing has been published yet
    #[error("No frame published yet on channel {0}")]
    NoFrameYet(String),

    /// Conditional fetch: the caller already has the current frame
    #[error("Not modified")]
    NotModified,

    /// A reference was requested for a frame that has already been freed
    #[error("Frame {0} has already been released")]
    FrameReleased(u64),

    /// Update into a channel that was removed from the registry
    #[error("Channel removed: {0}")]
    ChannelRemoved(String),

    /// Video source ended or failed
    #[error("Video source disconnected: {0}")]
    SourceDisconnected(String),

    /// AI engine returned an error
    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    /// Registry error
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status a transport should answer with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::NoFrameYet(_) => StatusCode::NO_CONTENT,
            Error::NotModified => StatusCode::NOT_MODIFIED,
            Error::ChannelRemoved(_) => StatusCode::NOT_FOUND,
            Error::Registry(RegistryError::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Registry(RegistryError::InvalidName(_)) => StatusCode::BAD_REQUEST,
            Error::Registry(_)
            | Error::FrameReleased(_)
            | Error::SourceDisconnected(_)
            | Error::InferenceFailed(_)
            | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code used in JSON error bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::NoFrameYet(_) => "NO_FRAME_YET",
            Error::NotModified => "NOT_MODIFIED",
            Error::FrameReleased(_) => "FRAME_RELEASED",
            Error::ChannelRemoved(_) => "CHANNEL_REMOVED",
            Error::SourceDisconnected(_) => "SOURCE_DISCONNECTED",
            Error::InferenceFailed(_) => "INFERENCE_FAILED",
            Error::Registry(RegistryError::NotFound(_)) => "NOT_FOUND",
            Error::Registry(RegistryError::LimitReached(_)) => "CHANNEL_LIMIT",
            Error::Registry(RegistryError::InvalidName(_)) => "INVALID_NAME",
            Error::Registry(RegistryError::RegistrationRace(_)) => "REGISTRATION_RACE",
            Error::Io(_) => "IO_ERROR",
        }
    }
}
