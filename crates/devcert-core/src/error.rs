use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevCertError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration directory error: {0}")]
    ConfigDir(String),

    #[error("OpenSSL error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    #[error("Invalid certificate validity window: {0}")]
    Validity(String),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Calendar arithmetic failed: {0}")]
    Calendar(#[from] time::error::ComponentRange),

    #[error("Failed to run `{command}`: {source}")]
    Command {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl DevCertError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DevCertError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DevCertError>;
