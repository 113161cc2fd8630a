use heartwatch_types::{ErrorCode, ReportError};

/// Errors raised while validating access or touching the authorization store.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("authorization store connection unavailable: {0}")]
    Connection(#[from] r2d2::Error),

    #[error("authorization store error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The event was allowed but its timestamp failed validation.
    #[error(transparent)]
    Report(#[from] ReportError),
}

impl AccessError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Report(e) => e.code(),
            Self::Connection(_) | Self::Database(_) => ErrorCode::StoreUnavailable,
        }
    }
}
