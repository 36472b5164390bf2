use thiserror::Error;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream API error for '{symbol}': {message}")]
    UpstreamApi { symbol: String, message: String },

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Transient errors are retried a bounded number of times before the
    /// symbol is skipped for the run.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::UpstreamApi { .. } | AppError::Reqwest(_))
    }

    /// Fatal errors halt the whole run; everything else is isolated to the
    /// symbol that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
