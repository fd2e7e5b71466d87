//! An in-process transport for tests.
//!
//! [`MockService`] records every request it receives and answers through a
//! handler closure, which can return a canned response or simulate a transport
//! failure. It also tracks how many requests were in flight at once.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http_body_util::BodyExt as _;
use parking_lot::Mutex;

/// A request as seen by the mock transport.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// The request method
    pub method: http::Method,
    /// The full request URI
    pub uri: http::Uri,
    /// The request headers
    pub headers: http::HeaderMap,
    /// The collected request body
    pub body: Bytes,
}

impl RecordedRequest {
    /// A header value as a string, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: http::StatusCode,
    headers: http::HeaderMap,
    body: Bytes,
}

impl MockResponse {
    /// An empty response with the given status.
    pub fn new(status: http::StatusCode) -> Self {
        Self {
            status,
            headers: http::HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// An empty `200 OK` response.
    pub fn ok() -> Self {
        Self::new(http::StatusCode::OK)
    }

    /// Add a response header.
    ///
    /// # Panics
    ///
    /// Panics if `value` is not a valid header value.
    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        let value = HeaderValue::try_from(value).expect("mock header value");
        self.headers.append(HeaderName::from_static(name), value);
        self
    }

    /// Set the response body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    fn into_response(self) -> http::Response<hyperdriver::Body> {
        let mut response = http::Response::new(hyperdriver::Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// What the mock transport should do with a request.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with a response.
    Respond(MockResponse),

    /// Fail as if the connection timed out.
    Fail,
}

type Handler = dyn Fn(&RecordedRequest) -> MockReply + Send + Sync;

struct MockState {
    handler: Box<Handler>,
    requests: Mutex<Vec<RecordedRequest>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlight<'s>(&'s MockState);

impl<'s> InFlight<'s> {
    fn enter(state: &'s MockState) -> Self {
        let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak.fetch_max(current, Ordering::SeqCst);
        InFlight(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A recording mock transport.
#[derive(Clone)]
pub struct MockService {
    state: Arc<MockState>,
    latency: Option<Duration>,
}

impl fmt::Debug for MockService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockService")
            .field("requests", &self.state.requests.lock().len())
            .field("latency", &self.latency)
            .finish()
    }
}

impl MockService {
    /// Create a mock transport answering through `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockReply + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(MockState {
                handler: Box::new(handler),
                requests: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
            latency: None,
        }
    }

    /// Delay each response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// All requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    /// The largest number of requests that were in flight at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }
}

impl tower::Service<http::Request<hyperdriver::Body>> for MockService {
    type Response = http::Response<hyperdriver::Body>;
    type Error = hyperdriver::client::Error;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<hyperdriver::Body>) -> Self::Future {
        let state = self.state.clone();
        let latency = self.latency;

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = body
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .unwrap_or_default();

            let recorded = RecordedRequest {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body,
            };

            state.requests.lock().push(recorded.clone());

            let reply = {
                let _guard = InFlight::enter(&state);
                match latency {
                    Some(latency) => tokio::time::sleep(latency).await,
                    None => tokio::task::yield_now().await,
                }
                (state.handler)(&recorded)
            };

            match reply {
                MockReply::Respond(response) => Ok(response.into_response()),
                MockReply::Fail => Err(hyperdriver::client::Error::RequestTimeout),
            }
        })
    }
}
