//! Error types for campus-market.

use thiserror::Error;

/// Errors surfaced by the queue, storage and CLI layers.
#[derive(Debug, Error)]
pub enum MarketError {
    /// Configuration could not be loaded, saved or resolved.
    #[error("configuration error: {0}")]
    Config(String),

    /// The local `SQLite` substrate failed.
    #[error("database error: {0}")]
    Database(String),

    /// A value could not be parsed or encoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// A requested entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote backend could not be reached or set up.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for MarketError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

/// Why a single backend dispatch did not apply.
///
/// The drainer treats every variant the same way (the entry stays queued);
/// the distinction only feeds logs and drain reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The request never completed (connection refused, DNS, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The dispatch exceeded its time budget.
    #[error("dispatch timed out after {0} ms")]
    Timeout(u64),

    /// The backend answered with a non-success status.
    #[error("backend rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The mutation could not be turned into a request.
    #[error("could not encode request: {0}")]
    Encode(String),
}

impl DispatchError {
    /// Whether a retry could plausibly succeed without changing the mutation.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Rejected { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Encode(_) => false,
        }
    }
}
