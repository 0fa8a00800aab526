use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Remote settings missing or malformed.
    #[error("config error: {0}")]
    Config(String),

    /// Import/restore payload is not a valid entry list.
    #[error("invalid format: {0}")]
    Format(String),

    /// Backup endpoint answered with a failure, or could not be reached.
    #[error("remote error: {message}")]
    Remote {
        status: Option<u16>,
        message: String,
    },

    /// User-supplied entry fields are unusable.
    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Remote {
            status,
            message: message.into(),
        }
    }
}
