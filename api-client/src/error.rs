//! Error types for API Clients
use thiserror::Error;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A request could not be completed at the HTTP layer.
///
/// Error statuses are not errors here; services interpret response status
/// codes themselves.
#[derive(Debug, Error)]
pub enum Error {
    /// The request could not be sent, or no response arrived in time
    #[error("sending request: {0}")]
    Request(#[source] hyperdriver::client::Error),

    /// The response body could not be read
    #[error("reading response body: {0}")]
    ResponseBody(#[source] BoxError),
}

impl Error {
    /// Whether the request timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Request(hyperdriver::client::Error::RequestTimeout)
        )
    }
}
