use thiserror::Error;

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("URL signing failed: {0}")]
    Signing(String),

    #[error("Download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl RestoreError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        RestoreError::Io {
            context: context.into(),
            source,
        }
    }
}

// Join errors only surface when a blocking archive task panics or is aborted.
impl From<tokio::task::JoinError> for RestoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        RestoreError::Unexpected(format!("archive worker did not finish: {}", err))
    }
}

/// Attaches a description of the failed step to raw I/O errors.
pub trait IoContext<T> {
    fn io_context<F, S>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::result::Result<T, std::io::Error> {
    fn io_context<F, S>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| RestoreError::io(context(), source))
    }
}

pub type Result<T> = std::result::Result<T, RestoreError>;
