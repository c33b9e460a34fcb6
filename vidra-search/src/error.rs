//! Error types for the vidra-search crate.
//!
//! The taxonomy distinguishes recoverable per-backend failures, which the
//! dispatcher absorbs and logs, from fatal conditions that are surfaced to
//! the caller with a specific kind. The engine never returns an empty
//! success when a fatal condition occurred.

use crate::types::SearchModel;

/// Errors that can occur during search orchestration.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Every enabled backend failed or timed out; no partial results exist.
    #[error("all search backends failed: {0}")]
    AllBackendsFailed(String),

    /// One backend did not answer within its time budget. Recoverable:
    /// the dispatcher drops this backend's contribution and proceeds.
    #[error("{model} backend timed out")]
    BackendTimeout {
        /// The backend that missed its deadline.
        model: SearchModel,
    },

    /// One backend failed outright. Recoverable, like [`Self::BackendTimeout`].
    #[error("{model} backend unavailable: {reason}")]
    BackendUnavailable {
        /// The failing backend.
        model: SearchModel,
        /// Backend-supplied failure detail.
        reason: String,
    },

    /// A query embedding could not be produced. Fatal: neither plain nor
    /// temporal search can proceed without one.
    #[error("query encoding failed: {0}")]
    EncodingFailed(String),

    /// Invalid configuration or request parameters, rejected at validation.
    #[error("config error: {0}")]
    InvalidConfig(String),
}

impl SearchError {
    /// Whether the dispatcher may absorb this error and continue with
    /// the remaining backends.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::BackendTimeout { .. } | Self::BackendUnavailable { .. }
        )
    }
}

/// Convenience type alias for vidra-search results.
pub type Result<T> = std::result::Result<T, SearchError>;
