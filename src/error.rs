//! Error type shared by the data pipeline, the network driver and persistence.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that terminate the current run
#[derive(Error, Debug)]
pub enum Error {
    /// The line source could not be opened, read, or yielded no rows
    #[error("unable to retrieve dataset from {source_name}: {reason}")]
    Retrieval { source_name: String, reason: String },

    /// A token in an expected-numeric row is not a decimal number
    #[error("unable to parse token '{token}' in row '{line}', expecting whitespace separated decimals")]
    Parse { line: String, token: String },

    /// A required argument or precondition is missing or inconsistent
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub(crate) fn retrieval(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Error::Retrieval {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(error: bincode::Error) -> Self {
        Error::Serialization(error.to_string())
    }
}
