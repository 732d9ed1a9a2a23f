use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed sidecar {}: {message}", path.display())]
    Format { path: PathBuf, message: String },

    #[error("No sidecar matched: {0}")]
    Match(String),

    #[error("Cannot parse date '{0}'")]
    DateParse(String),

    #[error("Overwrite of field '{field}' declined")]
    OverwriteCanceled { field: String },

    #[error("Operation canceled")]
    OperationCanceled,

    #[error(
        "Hash mismatch copying {} to {}",
        source_path.display(),
        destination.display()
    )]
    HashMismatch {
        source_path: PathBuf,
        destination: PathBuf,
    },

    #[error("Muxer failed: {0}")]
    Muxer(String),

    #[error("Prompt unavailable: {0}")]
    Prompt(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn format(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Error::Format {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Stable name used in log events and record failure lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Io { .. } => "io",
            Error::Format { .. } => "format",
            Error::Match(_) => "match",
            Error::DateParse(_) => "date-parse",
            Error::OverwriteCanceled { .. } => "overwrite-canceled",
            Error::OperationCanceled => "canceled",
            Error::HashMismatch { .. } => "hash-mismatch",
            Error::Muxer(_) => "muxer",
            Error::Prompt(_) => "prompt",
        }
    }
}

pub trait IoResultExt<T> {
    fn at_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| Error::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(Error::config("x").kind(), "config");
        assert_eq!(Error::OperationCanceled.kind(), "canceled");
        let io = Error::io("/tmp/a", std::io::Error::other("boom"));
        assert_eq!(io.kind(), "io");
        assert!(io.to_string().contains("/tmp/a"));
    }
}
