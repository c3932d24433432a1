use thiserror::Error;

/// Failure categories for the build/search/dedup pipeline.
///
/// The split matters at the boundaries: `Validation` maps to a client error
/// on the HTTP surface, `Integrity` refuses to serve a corrupt snapshot,
/// `Provider` marks upstream embedding failures, and `Parse` is scoped to a
/// single corpus file so ingestion can skip it and continue.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("cannot parse {file}: {message}")]
    Parse { file: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Provider(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
