//! A thin HTTP client shared by the object-store services.
//!
//! The client owns one long-lived connection pool and applies an overall
//! per-request timeout. Tests swap the transport for [`mock::MockService`].

use std::time::Duration;

use hyperdriver::service::SharedService;
use tower::{Layer as _, ServiceExt};

pub mod error;
pub mod mock;
pub mod request;
pub mod response;
mod timeout;

pub use self::error::Error;
pub use self::request::RequestExt;
pub use self::response::Response;
pub use self::timeout::{TimeoutLayer, TimeoutService};

/// Timeouts applied by an [`ApiClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTimeouts {
    /// Time allowed to establish a TCP connection.
    pub connect: Duration,

    /// Time allowed for a whole request, including the response headers.
    pub request: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            request: Duration::from_secs(60 * 60),
        }
    }
}

/// A client for accessing APIs over HTTP / HTTPS.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    inner: hyperdriver::client::SharedClientService<hyperdriver::Body, hyperdriver::Body>,
}

impl ApiClient {
    /// Create a new client backed by a TCP/TLS connection pool.
    pub fn new(timeouts: ClientTimeouts) -> Self {
        let mut builder = hyperdriver::Client::build_tcp_http();
        builder.transport().config_mut().connect_timeout = Some(timeouts.connect);

        let inner = builder
            .with_default_tls()
            .with_timeout(timeouts.request)
            .build_service();

        ApiClient { inner }
    }

    /// Create a client over an arbitrary transport service, applying `timeout`
    /// to each request.
    pub fn new_with_inner_service<S>(inner: S, timeout: Duration) -> Self
    where
        S: tower::Service<
                http::Request<hyperdriver::Body>,
                Response = http::Response<hyperdriver::Body>,
                Error = hyperdriver::client::Error,
            > + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        let service = TimeoutLayer::new(timeout).layer(inner);
        ApiClient {
            inner: SharedService::new(service),
        }
    }

    /// Send a request, returning the response regardless of its status.
    pub async fn execute(&self, req: http::Request<hyperdriver::Body>) -> Result<Response, Error> {
        let parts = req.parts();
        tracing::trace!(method=%parts.method, uri=%parts.uri, "sending request");

        let response = self
            .inner
            .clone()
            .oneshot(req)
            .await
            .map_err(Error::Request)?;
        Ok(Response::new(parts, response))
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use super::*;
    use crate::mock::{MockReply, MockResponse, MockService};

    #[tokio::test]
    async fn mock_client_records_requests() {
        let mock = MockService::new(|req| {
            assert_eq!(req.method, http::Method::PUT);
            MockReply::Respond(MockResponse::ok().header("etag", "\"abc\""))
        });

        let client = ApiClient::new_with_inner_service(mock.clone(), Duration::from_secs(5));
        let req = http::Request::builder()
            .method(http::Method::PUT)
            .uri("http://storage.test/object")
            .body(hyperdriver::Body::from(Bytes::from_static(b"frobulator")))
            .unwrap();

        let response = client.execute(req).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.uri().path(), "/object");

        let recorded = mock.requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].body.as_ref(), b"frobulator");
    }

    #[tokio::test]
    async fn transport_failures_surface_as_request_errors() {
        let mock = MockService::new(|_| MockReply::Fail);
        let client = ApiClient::new_with_inner_service(mock, Duration::from_secs(5));
        let req = http::Request::builder()
            .uri("http://storage.test/object")
            .body(hyperdriver::Body::empty())
            .unwrap();

        let error = client.execute(req).await.unwrap_err();
        assert!(matches!(error, Error::Request(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_transport_hits_the_request_timeout() {
        let mock = MockService::new(|_| MockReply::Respond(MockResponse::ok()))
            .with_latency(Duration::from_secs(30));
        let client = ApiClient::new_with_inner_service(mock, Duration::from_secs(5));
        let req = http::Request::builder()
            .uri("http://storage.test/object")
            .body(hyperdriver::Body::empty())
            .unwrap();

        let error = client.execute(req).await.unwrap_err();
        assert!(error.is_timeout());
    }
}
