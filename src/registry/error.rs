//! Registry error types
//!
//! Error types for channel registry operations.

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Channel not found
    #[error("Channel not found: {0}")]
    NotFound(String),
    /// Registry already holds the configured maximum number of channels
    #[error("Channel limit reached ({0})")]
    LimitReached(usize),
    /// Channel name is empty, too long, or contains a path separator
    #[error("Invalid channel name: {0:?}")]
    InvalidName(String),
    /// More than one channel object was observed for a single name
    #[error("Registration race on channel {0}")]
    RegistrationRace(String),
}
