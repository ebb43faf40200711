use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiverError {
    /// User-supplied URL was rejected; the message is shown to the caller verbatim.
    #[error("{0}")]
    InvalidUrl(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArchiverError>;
