use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use tracing_error::SpanTrace;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Categorizes blob storage errors independently of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobStorageErrorKind {
    /// The backend configuration is invalid.
    ///
    /// Raised when a storage backend is constructed, never deferred to first use.
    Configuration,

    /// A digest or location supplied by the caller is malformed.
    InvalidDigest,

    /// The network request failed or the backend answered with an error status.
    ///
    /// **Retryable:** Yes, the failure may be transient.
    Transport,

    /// The backend answered successfully, but with a response that could not
    /// be understood (e.g. a missing upload id or ETag).
    Protocol,

    /// The requested blob does not exist.
    NotFound,

    /// The backend rejected the credentials or the request signature.
    PermissionDenied,

    /// Reading the blob content failed locally.
    Io,

    /// The operation was cancelled by the caller.
    Cancelled,

    /// An uncategorized error.
    Other,
}

impl BlobStorageErrorKind {
    /// Returns whether this error kind typically indicates a retryable condition.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BlobStorageErrorKind::Transport | BlobStorageErrorKind::Io
        )
    }

    /// Returns whether this error indicates a caller-side fault.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            BlobStorageErrorKind::Configuration
                | BlobStorageErrorKind::InvalidDigest
                | BlobStorageErrorKind::PermissionDenied
        )
    }

    /// Returns whether this error indicates a fault of the storage service.
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            BlobStorageErrorKind::Transport | BlobStorageErrorKind::Protocol
        )
    }
}

impl fmt::Display for BlobStorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobStorageErrorKind::Configuration => write!(f, "configuration error"),
            BlobStorageErrorKind::InvalidDigest => write!(f, "invalid digest"),
            BlobStorageErrorKind::Transport => write!(f, "transport error"),
            BlobStorageErrorKind::Protocol => write!(f, "protocol error"),
            BlobStorageErrorKind::NotFound => write!(f, "not found"),
            BlobStorageErrorKind::PermissionDenied => write!(f, "permission denied"),
            BlobStorageErrorKind::Io => write!(f, "I/O error"),
            BlobStorageErrorKind::Cancelled => write!(f, "cancelled"),
            BlobStorageErrorKind::Other => write!(f, "other error"),
        }
    }
}

#[derive(Debug)]
struct ErrorTrace {
    backtrace: Backtrace,
    span_trace: SpanTrace,
}

impl ErrorTrace {
    #[track_caller]
    fn capture() -> Self {
        ErrorTrace {
            backtrace: Backtrace::capture(),
            span_trace: SpanTrace::capture(),
        }
    }
}

/// An error from a blob storage backend.
///
/// Besides the primary error, a storage error may carry a secondary
/// [cleanup failure](BlobStorageError::cleanup_failure): an error raised while
/// releasing remote state (such as aborting a multipart upload) after the
/// primary failure. The cleanup failure is reported alongside the primary
/// error and never replaces it.
///
/// # Example
///
/// ```rust
/// use blob_storage::{BlobStorageError, BlobStorageErrorKind};
///
/// let error = BlobStorageError::builder(
///     "cos",
///     BlobStorageErrorKind::NotFound,
///     std::io::Error::new(std::io::ErrorKind::NotFound, "no such key"),
/// )
///     .location("sha256/ab/abcdef")
///     .context("delete blob")
///     .build();
///
/// assert_eq!(error.location(), Some("sha256/ab/abcdef"));
/// ```
#[derive(Debug)]
pub struct BlobStorageError {
    kind: BlobStorageErrorKind,
    engine: &'static str,
    location: Option<String>,
    context: Option<String>,
    source: BoxError,
    cleanup: Option<BoxError>,
    traces: Box<ErrorTrace>,
}

impl StdError for BlobStorageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

impl BlobStorageError {
    /// Create a new storage error with the minimum required information.
    pub fn new<E>(engine: &'static str, kind: BlobStorageErrorKind, error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            kind,
            engine,
            location: None,
            context: None,
            source: error.into(),
            cleanup: None,
            traces: Box::new(ErrorTrace::capture()),
        }
    }

    /// Create a builder for constructing a storage error with full context.
    pub fn builder<E>(
        engine: &'static str,
        kind: BlobStorageErrorKind,
        error: E,
    ) -> BlobStorageErrorBuilder
    where
        E: Into<BoxError>,
    {
        BlobStorageErrorBuilder {
            engine,
            kind,
            source: error.into(),
            location: None,
            context: None,
            cleanup: None,
        }
    }

    /// Returns a boxed closure that creates a storage error from a downstream error,
    /// for use with `.map_err()`.
    ///
    /// ```rust
    /// use blob_storage::{BlobStorageError, BlobStorageErrorKind};
    ///
    /// fn operation() -> Result<(), BlobStorageError> {
    ///     std::fs::File::open("layer.tar")
    ///         .map_err(BlobStorageError::with("local", BlobStorageErrorKind::Io))?;
    ///     Ok(())
    /// }
    /// ```
    pub fn with<E>(
        engine: &'static str,
        kind: BlobStorageErrorKind,
    ) -> Box<dyn FnOnce(E) -> BlobStorageError + Send + Sync>
    where
        E: Into<BoxError>,
    {
        Box::new(move |error: E| BlobStorageError::new(engine, kind, error))
    }

    /// Returns the error kind.
    pub fn kind(&self) -> BlobStorageErrorKind {
        self.kind
    }

    /// Returns the storage engine name.
    pub fn engine(&self) -> &'static str {
        self.engine
    }

    /// Returns the blob location, if available.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Returns additional context, if available.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns the error raised while cleaning up after the primary failure, if any.
    pub fn cleanup_failure(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cleanup.as_deref()
    }

    /// Returns whether this error is likely retryable.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns whether this error indicates a caller-side fault.
    pub fn is_client_fault(&self) -> bool {
        self.kind.is_client_fault()
    }

    /// Returns whether this error indicates a server-side fault.
    pub fn is_server_fault(&self) -> bool {
        self.kind.is_server_fault()
    }

    /// Returns a reference to the captured backtrace.
    pub fn backtrace(&self) -> &Backtrace {
        &self.traces.backtrace
    }

    /// Returns a reference to the captured span trace.
    pub fn span_trace(&self) -> &SpanTrace {
        &self.traces.span_trace
    }
}

impl fmt::Display for BlobStorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blob storage error [{}] from {}", self.kind, self.engine)?;

        if let Some(location) = &self.location {
            write!(f, " (location: {})", location)?;
        }

        if let Some(context) = &self.context {
            write!(f, " ({})", context)?;
        }

        write!(f, ": {}", self.source)?;

        if let Some(cleanup) = &self.cleanup {
            write!(f, " [cleanup also failed: {}]", cleanup)?;
        }

        Ok(())
    }
}

/// Builder for constructing a [`BlobStorageError`] with optional context fields.
#[derive(Debug)]
pub struct BlobStorageErrorBuilder {
    kind: BlobStorageErrorKind,
    engine: &'static str,
    source: BoxError,
    location: Option<String>,
    context: Option<String>,
    cleanup: Option<BoxError>,
}

impl BlobStorageErrorBuilder {
    /// Set the blob location.
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set additional context.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Attach a secondary failure raised while cleaning up.
    pub fn cleanup_failure<E>(mut self, error: Option<E>) -> Self
    where
        E: Into<BoxError>,
    {
        self.cleanup = error.map(Into::into);
        self
    }

    /// Build the `BlobStorageError`.
    pub fn build(self) -> BlobStorageError {
        BlobStorageError {
            kind: self.kind,
            engine: self.engine,
            location: self.location,
            context: self.context,
            source: self.source,
            cleanup: self.cleanup,
            traces: Box::new(ErrorTrace::capture()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_cleanup_failure() {
        let error = BlobStorageError::builder(
            "cos",
            BlobStorageErrorKind::Transport,
            eyre::eyre!("part 2 failed"),
        )
        .location("sha256/ab/abcd")
        .cleanup_failure(Some(eyre::eyre!("abort failed")))
        .build();

        let message = error.to_string();
        assert!(message.starts_with("Blob storage error [transport error] from cos"));
        assert!(message.contains("part 2 failed"));
        assert!(message.contains("abort failed"));
        assert_eq!(
            error.cleanup_failure().map(|e| e.to_string()),
            Some("abort failed".to_owned())
        );
        assert_eq!(error.source().map(|e| e.to_string()), Some("part 2 failed".into()));
    }

    #[test]
    fn error_kinds_classify() {
        assert!(BlobStorageErrorKind::Transport.is_retryable());
        assert!(!BlobStorageErrorKind::Protocol.is_retryable());
        assert!(BlobStorageErrorKind::Configuration.is_client_fault());
        assert!(BlobStorageErrorKind::Protocol.is_server_fault());
    }
}
