use std::fmt;

use api_client::Response;
use blob_storage::BlobStorageErrorKind;
use http::StatusCode;
use thiserror::Error;

use crate::retry::Retryable;
use crate::signer::SignError;
use crate::xml;

/// An error response from the object store.
///
/// The body of an error response is an `<Error>` document; its fields are
/// kept for diagnostics. Bodies which are not such a document still produce
/// a `CosError` carrying only the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosError {
    status: StatusCode,
    code: Option<String>,
    message: Option<String>,
    resource: Option<String>,
    request_id: Option<String>,
    trace_id: Option<String>,
}

impl CosError {
    /// Parse an error from a response status and body.
    pub fn from_body(status: StatusCode, body: &str) -> Self {
        let field = |name: &str| xml::element(body, name).map(str::to_owned);
        CosError {
            status,
            code: field("Code"),
            message: field("Message"),
            resource: field("Resource"),
            request_id: field("RequestId"),
            trace_id: field("TraceId"),
        }
    }

    /// The HTTP status code of the response.
    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// The error code, e.g. `NoSuchKey`.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// The human readable message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The resource the error refers to.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// The request id assigned by the object store.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// The trace id assigned by the object store.
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }
}

impl fmt::Display for CosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)?;
        if let Some(code) = &self.code {
            write!(f, " {code}")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, " (request {request_id})")?;
        }
        Ok(())
    }
}

impl std::error::Error for CosError {}

/// An error that occurred while making a request to the object store.
#[derive(Debug, Error)]
pub enum CosRequestError {
    /// The object store answered with an error status.
    #[error(transparent)]
    Cos(#[from] CosError),

    /// The request failed in transit, or timed out.
    #[error("client: {0}")]
    Client(#[from] api_client::Error),

    /// Reading the blob content failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The request could not be signed.
    #[error("signing: {0}")]
    Sign(#[from] SignError),

    /// A request URI could not be built.
    #[error("uri: {0}")]
    Uri(#[from] http::uri::InvalidUri),

    /// A request could not be built.
    #[error("request: {0}")]
    Http(#[from] http::Error),

    /// The object store answered successfully but the response was unusable.
    #[error("protocol: {0}")]
    Protocol(String),

    /// The caller cancelled the operation.
    #[error("cancelled")]
    Cancelled,
}

impl CosRequestError {
    /// Get a reference to the object store error, if there is one.
    pub fn cos(&self) -> Option<&CosError> {
        match self {
            CosRequestError::Cos(err) => Some(err),
            _ => None,
        }
    }

    pub(crate) fn kind(&self) -> BlobStorageErrorKind {
        match self {
            CosRequestError::Cos(err) => match err.status_code() {
                StatusCode::NOT_FOUND => BlobStorageErrorKind::NotFound,
                StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                    BlobStorageErrorKind::PermissionDenied
                }
                _ => BlobStorageErrorKind::Transport,
            },
            CosRequestError::Client(_) => BlobStorageErrorKind::Transport,
            CosRequestError::Io(_) => BlobStorageErrorKind::Io,
            CosRequestError::Uri(_) => BlobStorageErrorKind::InvalidDigest,
            CosRequestError::Sign(_) | CosRequestError::Http(_) => BlobStorageErrorKind::Other,
            CosRequestError::Protocol(_) => BlobStorageErrorKind::Protocol,
            CosRequestError::Cancelled => BlobStorageErrorKind::Cancelled,
        }
    }
}

impl Retryable for CosRequestError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            CosRequestError::Cos(_) | CosRequestError::Client(_) | CosRequestError::Io(_)
        )
    }
}

#[async_trait::async_trait]
pub(crate) trait CosResponseExt {
    async fn handle_errors(self) -> Result<Self, CosRequestError>
    where
        Self: Sized;
}

#[async_trait::async_trait]
impl CosResponseExt for Response {
    async fn handle_errors(self) -> Result<Self, CosRequestError> {
        if self.status().is_success() {
            Ok(self)
        } else {
            let url = self.uri().clone();
            let method = self.method().clone();
            let status = self.status();
            let text = self.text().await?;

            let err = CosError::from_body(status, &text);
            tracing::debug!(%method, %url, error=%err, "object store returned an error");
            cos_response_breadcrumb(&err, &method, &url);
            Err(err.into())
        }
    }
}

fn cos_response_breadcrumb(error: &CosError, method: &http::Method, url: &http::Uri) {
    use sentry::protocol::{Breadcrumb, Map};

    let breadcrumb = Breadcrumb {
        ty: "http".into(),
        category: Some("request".into()),
        data: {
            let mut map = Map::new();
            map.insert("method".into(), method.as_str().into());
            map.insert("url".into(), url.path().into());
            map.insert("status_code".into(), error.status_code().as_u16().into());
            if let Some(code) = error.code() {
                map.insert("code".into(), code.into());
            }
            if let Some(request_id) = error.request_id() {
                map.insert("request_id".into(), request_id.into());
            }
            map.insert("service".into(), "cos".into());
            map
        },
        ..Default::default()
    };

    sentry::add_breadcrumb(breadcrumb);
}
