use std::path::{Path, PathBuf};
use thiserror::Error;

/// Every error the library surface can return.
///
/// Skips during drive planning (vanished source, no deployed copy) are not
/// errors and never show up here.
#[derive(Debug, Error)]
pub enum RekordsyncError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error("Invalid catalog format: {0}")]
    InvalidFormat(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Watch(#[from] notify::Error),
}

impl RekordsyncError {
    /// Disk trouble, as opposed to a file whose content we reject.
    pub fn is_io(&self) -> bool {
        matches!(self, RekordsyncError::Io { .. } | RekordsyncError::Walk(_))
    }

    pub fn is_invalid_format(&self) -> bool {
        matches!(self, RekordsyncError::InvalidFormat(_))
    }
}

pub type AnyResult<T, E = RekordsyncError> = Result<T, E>;

/// Attaches the offending path to a raw `std::io` failure.
pub trait IoResultExt<T> {
    fn at(self, path: &Path) -> AnyResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: &Path) -> AnyResult<T> {
        self.map_err(|source| RekordsyncError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_carry_their_path() {
        let missing = Path::new("/definitely/not/here.xml");
        let err = std::fs::read(missing).at(missing).unwrap_err();

        assert!(err.is_io());
        assert!(!err.is_invalid_format());
        assert!(err.to_string().contains("here.xml"));
    }

    #[test]
    fn format_errors_are_distinct_from_io() {
        let err = RekordsyncError::InvalidFormat("Missing DJ_PLAYLISTS root element".into());
        assert!(err.is_invalid_format());
        assert!(!err.is_io());
    }
}
