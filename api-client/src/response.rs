//! Response wrapper which remembers the request that produced it.

use bytes::Bytes;
use http_body_util::BodyExt as _;
use hyperdriver::Body;

use crate::error::Error;

/// An HTTP response, paired with the parts of the request that generated it.
#[derive(Debug)]
pub struct Response {
    request: http::request::Parts,
    response: http::response::Parts,
    body: Body,
}

impl Response {
    /// Create a new `Response` instance.
    pub fn new(request: http::request::Parts, response: http::Response<Body>) -> Self {
        let (response, body) = response.into_parts();

        Self {
            request,
            response,
            body,
        }
    }

    /// Get the status code of the response.
    pub fn status(&self) -> http::StatusCode {
        self.response.status
    }

    /// Get the headers of the response.
    pub fn headers(&self) -> &http::HeaderMap {
        &self.response.headers
    }

    /// Get a single header as a string, if present and valid UTF-8.
    pub fn header_str(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.response
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    /// Get the URI of the request that generated the response.
    pub fn uri(&self) -> &http::Uri {
        &self.request.uri
    }

    /// Get the method of the request that generated the response.
    pub fn method(&self) -> &http::Method {
        &self.request.method
    }

    /// Collect the whole response body.
    pub async fn bytes(self) -> Result<Bytes, Error> {
        let collected = self
            .body
            .collect()
            .await
            .map_err(|err| Error::ResponseBody(err.into()))?;
        Ok(collected.to_bytes())
    }

    /// Collect the response body as (lossy) UTF-8 text.
    pub async fn text(self) -> Result<String, Error> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Take the response body for streaming.
    pub fn into_body(self) -> Body {
        self.body
    }
}
