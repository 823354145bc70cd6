use thiserror::Error;

/// Top-level error type for the butler.
///
/// Subsystem crates define their own error enums and convert into this one
/// at the composition root, so `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ButlerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for ButlerError {
    fn from(err: toml::de::Error) -> Self {
        ButlerError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ButlerError {
    fn from(err: toml::ser::Error) -> Self {
        ButlerError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ButlerError {
    fn from(err: serde_json::Error) -> Self {
        ButlerError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for butler operations.
pub type Result<T> = std::result::Result<T, ButlerError>;
