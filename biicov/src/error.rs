use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while configuring or running an extraction.
///
/// Nothing is retried locally: every variant aborts the current call and
/// surfaces to the caller.
#[derive(Debug, Error)]
pub enum BiiError {
    /// Unknown country, missing output path or an invalid option value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A named catalog dataset is missing or does not have the expected schema.
    #[error("data source `{dataset}`: {message}")]
    DataSource { dataset: String, message: String },

    /// An output or catalog path could not be created, read or written.
    #[error("filesystem error at {path:?}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BiiError {
    pub fn data_source(dataset: impl Into<String>, message: impl Into<String>) -> Self {
        BiiError::DataSource {
            dataset: dataset.into(),
            message: message.into(),
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BiiError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BiiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_source_message() {
        let err = BiiError::data_source("USDOS/LSIB/2017", "dataset not found");
        assert_eq!(
            err.to_string(),
            "data source `USDOS/LSIB/2017`: dataset not found"
        );
    }

    #[test]
    fn test_filesystem_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = BiiError::filesystem("/out/Kenya", io);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("/out/Kenya"));
    }
}
