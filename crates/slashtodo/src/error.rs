//! Error types for todo storage and command handling.
//!
//! ## Error Cases
//! - `NotFound`: the requested todo does not exist in the channel.
//! - `NotOwner`: a user other than the creator tried to close a todo.
//! - `EmptyTitle`: a todo was submitted without a title.
//! - `Contention`: the channel record kept changing underneath a conditional
//!   write until the retry budget ran out.
//! - `InvalidAdminToken` / `InvalidScope`: an admin token or requested scope
//!   is malformed.
//! - `Serialization` / `Redis` / `Backend`: the store failed.

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for the todo store.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No todo matches the lookup.
    #[error("no todo with {field}[{value}] could be found")]
    NotFound { field: &'static str, value: String },

    /// Only the creator of a todo may close it.
    #[error("task can only be closed by creator")]
    NotOwner,

    /// Todos need a non-blank title.
    #[error("a task needs a non-empty title")]
    EmptyTitle,

    /// Every conditional write attempt lost against a concurrent writer.
    #[error("channel record kept changing, gave up after {attempts} attempts")]
    Contention { attempts: usize },

    /// A scoped admin token was malformed.
    #[error("invalid admin token: {reason}")]
    InvalidAdminToken { reason: String },

    /// An admin request named a scope that cannot exist.
    #[error("invalid scope: {reason}")]
    InvalidScope { reason: String },

    /// A stored document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Catch-all for backend failures that carry no structured source.
    #[error("backend error: {0}")]
    Backend(String),
}

impl Error {
    pub(crate) fn not_found(field: &'static str, value: impl Into<String>) -> Self {
        Self::NotFound {
            field,
            value: value.into(),
        }
    }

    /// Whether the failure came from the caller's input rather than the store.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::NotOwner | Self::EmptyTitle | Self::InvalidScope { .. }
        )
    }
}
