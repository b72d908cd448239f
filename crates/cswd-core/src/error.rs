use std::fmt::{Display, Formatter};

use cswd_warehouse::WarehouseError;
use thiserror::Error;
use time::Date;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Unavailable,
    RateLimited,
    InvalidResponse,
    InvalidRequest,
}

impl FetchErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "source.unavailable",
            Self::RateLimited => "source.rate_limited",
            Self::InvalidResponse => "source.invalid_response",
            Self::InvalidRequest => "source.invalid_request",
        }
    }
}

/// Failure reported by a source fetcher. Network, parse and upstream errors
/// all land here; the cache never retries on the fetcher's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
}

impl FetchError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::RateLimited,
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::InvalidResponse,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::InvalidRequest,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> &'static str {
        self.kind.as_str()
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid cache operation name '{0}'")]
    InvalidOperation(String),

    #[error("fetch '{operation}' failed: {source}")]
    Fetch {
        operation: String,
        #[source]
        source: FetchError,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdjustmentError {
    #[error("{date} has a zero close and no previous close to fill it")]
    NoPreviousClose { date: Date },

    #[error("expected {expected} percentage changes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("cannot adjust an empty series")]
    Empty,

    #[error("base price is zero at index {index}")]
    ZeroBase { index: usize },
}

/// Outcome of one entity's refresh when it did not append.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] CacheError),

    #[error("{code}: payload carries {actual} items, expected {expected}")]
    SchemaMismatch {
        code: String,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Storage(#[from] WarehouseError),

    #[error(transparent)]
    Adjustment(#[from] AdjustmentError),
}

impl RefreshError {
    /// Engine and disk failures stop the batch. Rejected rows, key clashes
    /// and source failures stay with the entity that raised them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Storage(WarehouseError::DuckDb(_) | WarehouseError::Io(_))
                | Self::Fetch(CacheError::Io(_))
        )
    }
}

/// Errors of the read-side queries.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Storage(#[from] WarehouseError),

    #[error(transparent)]
    Adjustment(#[from] AdjustmentError),
}
