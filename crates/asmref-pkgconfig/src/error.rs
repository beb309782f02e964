use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PkgConfigError {
    #[error("failed to access `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed package cache document: {0}")]
    Xml(String),

    #[error("invalid timestamp `{value}`: {message}")]
    Timestamp { value: String, message: String },

    #[error("package cache `{path}` is locked by another process")]
    LockContended { path: PathBuf },
}

impl PkgConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = PkgConfigError> = std::result::Result<T, E>;
