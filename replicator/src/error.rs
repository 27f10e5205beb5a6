use std::error::Error;
use std::fmt;

use movies_etl::error::EtlError;

pub type ReplicatorResult<T> = Result<T, ReplicatorError>;

/// Error type for the replicator process.
///
/// Wraps [`EtlError`] for sync failures and keeps setup failures apart so they can be reported
/// with their own category.
#[derive(Debug)]
pub enum ReplicatorError {
    Etl(EtlError),
    Config(Box<dyn Error + Send + Sync>),
    Io(std::io::Error),
}

impl ReplicatorError {
    pub fn category(&self) -> &'static str {
        match self {
            ReplicatorError::Etl(_) => "sync error",
            ReplicatorError::Config(_) => "configuration error",
            ReplicatorError::Io(_) => "i/o error",
        }
    }

    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        ReplicatorError::Config(Box::new(err))
    }
}

impl fmt::Display for ReplicatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicatorError::Etl(err) => write!(f, "{err}"),
            ReplicatorError::Config(err) => write!(f, "configuration error: {err}"),
            ReplicatorError::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl Error for ReplicatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReplicatorError::Etl(err) => Some(err),
            ReplicatorError::Config(err) => Some(err.as_ref()),
            ReplicatorError::Io(err) => Some(err),
        }
    }
}

impl From<EtlError> for ReplicatorError {
    fn from(err: EtlError) -> Self {
        ReplicatorError::Etl(err)
    }
}

impl From<std::io::Error> for ReplicatorError {
    fn from(err: std::io::Error) -> Self {
        ReplicatorError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use movies_etl::error::ErrorKind;

    use super::*;

    #[test]
    fn etl_errors_keep_their_message() {
        let err = ReplicatorError::from(EtlError::from((
            ErrorKind::SourceConnectionFailed,
            "Database unreachable",
        )));

        assert_eq!(err.category(), "sync error");
        assert!(err.to_string().contains("Database unreachable"));
        assert!(err.source().is_some());
    }

    #[test]
    fn io_errors_are_categorized() {
        let err = ReplicatorError::from(std::io::Error::other("disk full"));

        assert_eq!(err.category(), "i/o error");
        assert_eq!(err.to_string(), "i/o error: disk full");
    }
}
