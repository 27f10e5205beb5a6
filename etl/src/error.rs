//! Error types and result definitions for sync operations.
//!
//! [`EtlError`] carries an [`ErrorKind`] used to decide how the sync loop reacts (retry, defer
//! the batch or abort), a static description, optional dynamic detail, an optional source error
//! and the location where it was created. Several errors can be aggregated into one.

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use crate::types::ParseWatermarkError;

/// Convenient result type for sync operations.
pub type EtlResult<T> = Result<T, EtlError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
}

/// Main error type of the sync engine.
#[derive(Debug, Clone)]
pub struct EtlError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<EtlError>,
        location: &'static Location<'static>,
    },
}

/// Categories of failures, grouped by the component that raises them.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection errors, retried with backoff.
    SourceConnectionFailed,
    DestinationConnectionFailed,

    // Query and write errors.
    SourceQueryFailed,
    DestinationQueryFailed,
    /// The index rejected some documents of a bulk write.
    DestinationPartialWrite,

    // Data errors.
    ConversionError,
    InvalidData,
    SerializationError,
    DeserializationError,

    // Configuration and local I/O errors.
    ConfigError,
    IoError,

    // Workflow errors.
    InvalidState,

    // General errors.
    SourceError,
    DestinationError,
    Unknown,
}

impl ErrorKind {
    /// Returns `true` when the failure is a connectivity problem worth retrying.
    pub fn is_connection_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::SourceConnectionFailed | ErrorKind::DestinationConnectionFailed
        )
    }
}

impl EtlError {
    /// Returns the [`ErrorKind`] of this error, or of the first aggregated error.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.kind,
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match &self.repr {
            ErrorRepr::Single(payload) => vec![payload.kind],
            ErrorRepr::Many { errors, .. } => errors.iter().flat_map(|err| err.kinds()).collect(),
        }
    }

    /// Returns the dynamic detail, or the first one found among aggregated errors.
    pub fn detail(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.detail.as_deref(),
            ErrorRepr::Many { errors, .. } => errors.iter().find_map(|err| err.detail()),
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches the originating error. Has no effect on aggregated errors.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
            }),
        }
    }

    #[track_caller]
    fn with_detail_of<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        EtlError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                write!(
                    f,
                    "[{:?}] {} @ {}:{}",
                    payload.kind,
                    payload.description,
                    payload.location.file(),
                    payload.location.line(),
                )?;
                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, "\n  Detail: {detail}")?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                write!(
                    f,
                    "[Many] {} errors aggregated @ {}:{}",
                    errors.len(),
                    location.file(),
                    location.line(),
                )?;
                for (index, error) in errors.iter().enumerate() {
                    for (line_index, line) in error.to_string().lines().enumerate() {
                        if line_index == 0 {
                            write!(f, "\n  {}. {line}", index + 1)?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned as is.
impl<E> From<Vec<E>> for EtlError
where
    E: Into<EtlError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> EtlError {
        let location = Location::caller();
        let mut errors: Vec<EtlError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        EtlError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        EtlError::with_detail_of(ErrorKind::IoError, "I/O operation failed", err)
    }
}

impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        EtlError::with_detail_of(kind, description, err)
    }
}

impl From<chrono::ParseError> for EtlError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> EtlError {
        EtlError::with_detail_of(ErrorKind::ConversionError, "Timestamp parsing failed", err)
    }
}

impl From<uuid::Error> for EtlError {
    #[track_caller]
    fn from(err: uuid::Error) -> EtlError {
        EtlError::with_detail_of(ErrorKind::ConversionError, "UUID parsing failed", err)
    }
}

impl From<ParseWatermarkError> for EtlError {
    #[track_caller]
    fn from(err: ParseWatermarkError) -> EtlError {
        EtlError::with_detail_of(ErrorKind::ConversionError, "Watermark parsing failed", err)
    }
}

/// Converts [`sqlx::Error`] to [`EtlError`].
///
/// Transport failures, pool timeouts and SQLSTATE class `08` (connection exception) or `57P0x`
/// (server shutting down) map to [`ErrorKind::SourceConnectionFailed`] so they are retried.
impl From<sqlx::Error> for EtlError {
    #[track_caller]
    fn from(err: sqlx::Error) -> EtlError {
        let kind = match &err {
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
                ErrorKind::SourceConnectionFailed
            }
            sqlx::Error::Database(db_err) => match db_err.code() {
                Some(code) if code.starts_with("08") || code.starts_with("57P0") => {
                    ErrorKind::SourceConnectionFailed
                }
                _ => ErrorKind::SourceQueryFailed,
            },
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                ErrorKind::ConversionError
            }
            sqlx::Error::PoolClosed => ErrorKind::SourceError,
            _ => ErrorKind::SourceQueryFailed,
        };

        EtlError::with_detail_of(kind, "Source database operation failed", err)
    }
}

/// Converts [`reqwest::Error`] to [`EtlError`].
///
/// Connect and timeout failures map to [`ErrorKind::DestinationConnectionFailed`].
impl From<reqwest::Error> for EtlError {
    #[track_caller]
    fn from(err: reqwest::Error) -> EtlError {
        let kind = if err.is_connect() || err.is_timeout() || err.is_request() {
            ErrorKind::DestinationConnectionFailed
        } else if err.is_decode() {
            ErrorKind::DeserializationError
        } else {
            ErrorKind::DestinationError
        };

        EtlError::with_detail_of(kind, "Search index request failed", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl_error;

    #[test]
    fn single_error_keeps_kind_and_detail() {
        let err = etl_error!(
            ErrorKind::DestinationPartialWrite,
            "Bulk write partially failed",
            "1 of 50 documents rejected"
        );

        assert_eq!(err.kind(), ErrorKind::DestinationPartialWrite);
        assert_eq!(err.detail(), Some("1 of 50 documents rejected"));
        assert!(err.to_string().contains("Bulk write partially failed"));
    }

    #[test]
    fn aggregated_errors_expose_all_kinds() {
        let err: EtlError = vec![
            etl_error!(ErrorKind::SourceQueryFailed, "first"),
            etl_error!(ErrorKind::IoError, "second"),
        ]
        .into();

        assert_eq!(err.kind(), ErrorKind::SourceQueryFailed);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::SourceQueryFailed, ErrorKind::IoError]
        );
        assert!(err.to_string().starts_with("[Many] 2 errors"));
    }

    #[test]
    fn single_element_vec_is_not_wrapped() {
        let err: EtlError = vec![etl_error!(ErrorKind::InvalidData, "only")].into();

        assert_eq!(err.kinds(), vec![ErrorKind::InvalidData]);
    }

    #[test]
    fn io_timeouts_from_sqlx_are_retryable() {
        let err: EtlError = sqlx::Error::PoolTimedOut.into();

        assert!(err.kind().is_connection_retryable());
    }

    #[test]
    fn closed_pool_is_not_retryable() {
        let err: EtlError = sqlx::Error::PoolClosed.into();

        assert!(!err.kind().is_connection_retryable());
    }
}
