use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("The file could not be written to. Check that appropriate permissions have been set.")]
    SinkNotWritable,

    #[error("Invalid date format: {0}")]
    InvalidDateFormat(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

impl From<serde_json::Error> for LogError {
    fn from(err: serde_json::Error) -> Self {
        LogError::InvalidOption(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LogError>;
