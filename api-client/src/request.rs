//! Helpers for outgoing requests.

/// Extension methods for [`http::Request`].
pub trait RequestExt {
    /// Clone the method, URI, version and headers of the request, without the body.
    fn parts(&self) -> http::request::Parts;
}

impl<B> RequestExt for http::Request<B> {
    fn parts(&self) -> http::request::Parts {
        let (mut parts, _) = http::Request::new(()).into_parts();
        parts.method = self.method().clone();
        parts.uri = self.uri().clone();
        parts.version = self.version();
        parts.headers = self.headers().clone();
        parts
    }
}
