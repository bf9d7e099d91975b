use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Framework error: {0}")]
    Framework(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

/// Coarse classification used by callers that only care about who is at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    InvalidInput,
    Framework,
}

impl Error {
    /// Transport and serialization failures surface while the backend is
    /// running, so they count as framework errors.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Framework(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Http(_)
            | Error::External(_) => ErrorKind::Framework,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub fn is_invalid_input(&self) -> bool {
        self.kind() == ErrorKind::InvalidInput
    }
}

pub type Result<T> = std::result::Result<T, Error>;
