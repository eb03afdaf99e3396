use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Machine-checkable classification of every caller-facing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Validation,
    BackendExecution,
    Transaction,
    Cascade,
    NotificationDelivery,
    Cancelled,
    DeadlineExceeded,
    Config,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed or missing option combination. Nothing was executed.
    #[error("{0}")]
    Validation(String),

    /// A statement failed, constraint violations included.
    #[error("{context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// begin / commit failed.
    #[error("{context}: {source}")]
    Transaction {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// A dependent step of a cascade failed; the whole transaction was rolled back.
    #[error("{context}: {source}")]
    Cascade {
        context: String,
        #[source]
        source: Box<StoreError>,
    },

    /// Misuse of the transaction coordinator, e.g. a second begin.
    #[error("transaction misuse: {0}")]
    Contract(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("config: {0}")]
    Config(String),

    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("completion dropped before delivering a result")]
    Dropped,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        use StoreError::*;
        match self {
            Validation(_) => ErrorKind::Validation,
            Backend { .. } => ErrorKind::BackendExecution,
            Transaction { .. } => ErrorKind::Transaction,
            Cascade { .. } => ErrorKind::Cascade,
            Cancelled => ErrorKind::Cancelled,
            DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Config(_) => ErrorKind::Config,
            Contract(_) | Codec(_) | Dropped => ErrorKind::Internal,
        }
    }

    pub(crate) fn backend(context: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Backend { context: context.into(), source }
    }

    pub(crate) fn transaction(context: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Transaction { context: context.into(), source }
    }

    /// Marks an error raised by a dependent step of a cascade. Cancellation is
    /// passed through untouched so callers can still tell it apart.
    pub(crate) fn cascade(self, context: impl Into<String>) -> Self {
        match self {
            Self::Cancelled | Self::DeadlineExceeded => self,
            err => Self::Cascade { context: context.into(), source: Box::new(err) },
        }
    }

    /// True when the backend rejected a write because of a unique key.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Backend { source: sqlx::Error::Database(db), .. } => db.is_unique_violation(),
            Self::Cascade { source, .. } => source.is_unique_violation(),
            _ => false,
        }
    }

    pub fn problem(&self, title: impl Into<String>) -> ProblemDetail {
        ProblemDetail {
            title: title.into(),
            kind: self.kind(),
            detail: self.to_string(),
        }
    }
}

/// Serialisable error envelope handed to handler layers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetail {
    pub title: String,
    pub kind: ErrorKind,
    pub detail: String,
}

pub(crate) trait SqlxResultExt<T> {
    fn or_backend(self, context: &str) -> StoreResult<T>;
}

impl<T> SqlxResultExt<T> for Result<T, sqlx::Error> {
    fn or_backend(self, context: &str) -> StoreResult<T> {
        self.map_err(|err| StoreError::backend(context, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(StoreError::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(
            StoreError::backend("insert", sqlx::Error::RowNotFound).kind(),
            ErrorKind::BackendExecution
        );
        assert_eq!(
            StoreError::transaction("commit", sqlx::Error::PoolClosed).kind(),
            ErrorKind::Transaction
        );
        assert_eq!(StoreError::Dropped.kind(), ErrorKind::Internal);
    }

    #[test]
    fn cascade_wraps_but_keeps_cancellation() {
        let err = StoreError::backend("update", sqlx::Error::RowNotFound).cascade("invalidate");
        assert_eq!(err.kind(), ErrorKind::Cascade);
        assert!(err.to_string().starts_with("invalidate: update"));

        assert_eq!(StoreError::Cancelled.cascade("x").kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn problem_detail_carries_kind_and_message() {
        let pd = StoreError::Validation("no filter".into()).problem("Failed to delete devices.");
        assert_eq!(pd.kind, ErrorKind::Validation);
        assert_eq!(pd.detail, "no filter");
        let json = serde_json::to_value(&pd).unwrap();
        assert_eq!(json["kind"], "validation");
    }
}
