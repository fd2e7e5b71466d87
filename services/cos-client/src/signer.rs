//! Request signing for the COS object store.
//!
//! Every request carries an `Authorization` header of the form
//!
//! ```text
//! q-sign-algorithm=sha1&q-ak=<id>&q-sign-time=<t>&q-key-time=<t>
//!     &q-header-list=<names>&q-url-param-list=<names>&q-signature=<hex>
//! ```
//!
//! where the signature is an HMAC-SHA1 over a canonical form of the method,
//! path, query parameters and headers. Presigned URLs carry the same string
//! as their query.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha1::{Digest as _, Sha1};
use thiserror::Error;

use crate::credentials::Credentials;

type HmacSha1 = Hmac<Sha1>;

/// How long a signing key stays valid, in seconds.
pub const KEY_TIME_VALIDITY: i64 = 30 * 60;

/// Bytes left unescaped by [`cos_encode`]: ASCII alphanumerics and `-_.`.
const COS_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Percent-encode a key or value for the canonical request.
///
/// Space becomes `%20` and reserved characters such as `!()*~` are escaped,
/// always with uppercase hex digits.
pub fn cos_encode(input: &str) -> String {
    utf8_percent_encode(input, COS_ENCODE_SET).to_string()
}

/// Hex-encoded HMAC-SHA1 of `message` under `key`.
pub fn hmac_sha1_hex(key: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

fn sha1_hex(message: &[u8]) -> String {
    hex::encode(Sha1::digest(message))
}

/// Format a timestamp as an HTTP `Date` header value.
pub fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// A request could not be signed.
#[derive(Debug, Error)]
pub enum SignError {
    /// Headers with more than one value cannot be canonicalized.
    #[error("header {0} has multiple values and cannot be signed")]
    MultiValuedHeader(HeaderName),

    /// A query parameter appears more than once.
    #[error("query parameter {0:?} appears more than once and cannot be signed")]
    DuplicateParameter(String),

    /// A header value is not visible ASCII.
    #[error("header {0} is not visible ASCII")]
    OpaqueHeader(HeaderName),

    /// The request URI has no host to sign.
    #[error("request URI {0} has no host")]
    MissingHost(Uri),

    /// A computed header value was invalid.
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] header::InvalidHeaderValue),

    /// The presigned URI could not be assembled.
    #[error("invalid presigned URI: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),
}

/// The validity window of a signing key, in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTime {
    start: i64,
    end: i64,
}

impl KeyTime {
    /// An explicit `[start, end]` window.
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// A window of [`KEY_TIME_VALIDITY`] seconds starting at `now`.
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        let start = now.timestamp();
        Self::new(start, start + KEY_TIME_VALIDITY)
    }
}

impl fmt::Display for KeyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.start, self.end)
    }
}

/// Which headers take part in the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScope {
    /// All request headers are signed (the `Authorization` header case).
    Headers,

    /// Only `content-*` headers are signed (the presigned URL case).
    QueryOnly,
}

/// Sorted, encoded `key=value` pairs and their `;`-joined key list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CanonicalPairs {
    pairs: String,
    keys: String,
}

impl CanonicalPairs {
    fn from_map(map: BTreeMap<String, String>) -> Self {
        let mut pairs = Vec::with_capacity(map.len());
        let mut keys = Vec::with_capacity(map.len());
        for (key, value) in &map {
            pairs.push(format!("{key}={value}"));
            keys.push(key.as_str());
        }

        Self {
            pairs: pairs.join("&"),
            keys: keys.join(";"),
        }
    }

    /// Canonicalize the query parameters of `uri`.
    ///
    /// Parameters without a value sign as `key=`.
    pub fn query(uri: &Uri) -> Result<Self, SignError> {
        let mut map = BTreeMap::new();
        for component in uri.query().unwrap_or_default().split('&') {
            if component.is_empty() {
                continue;
            }

            let (key, value) = component.split_once('=').unwrap_or((component, ""));
            let key = percent_decode_str(key).decode_utf8_lossy().to_lowercase();
            let value = percent_decode_str(value).decode_utf8_lossy();

            let key = cos_encode(&key);
            if map.insert(key.clone(), cos_encode(&value)).is_some() {
                return Err(SignError::DuplicateParameter(key));
            }
        }

        Ok(Self::from_map(map))
    }

    /// Canonicalize the headers which participate under `scope`.
    pub fn headers(headers: &HeaderMap, scope: SignatureScope) -> Result<Self, SignError> {
        let mut map = BTreeMap::new();
        for name in headers.keys() {
            if scope == SignatureScope::QueryOnly && !name.as_str().starts_with("content-") {
                continue;
            }

            let mut values = headers.get_all(name).iter();
            let (Some(value), None) = (values.next(), values.next()) else {
                return Err(SignError::MultiValuedHeader(name.clone()));
            };
            let value = value
                .to_str()
                .map_err(|_| SignError::OpaqueHeader(name.clone()))?;

            map.insert(cos_encode(name.as_str()), cos_encode(value));
        }

        Ok(Self::from_map(map))
    }

    /// The `&`-joined `key=value` pairs.
    pub fn pairs(&self) -> &str {
        &self.pairs
    }

    /// The `;`-joined keys.
    pub fn keys(&self) -> &str {
        &self.keys
    }
}

/// A computed request signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    secret_id: String,
    key_time: KeyTime,
    header_list: String,
    param_list: String,
    signature: String,
}

impl Signature {
    /// The hex-encoded signature.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The signed header names.
    pub fn header_list(&self) -> &str {
        &self.header_list
    }

    /// The signed query parameter names.
    pub fn param_list(&self) -> &str {
        &self.param_list
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "q-sign-algorithm=sha1&q-ak={id}&q-sign-time={time}&q-key-time={time}\
             &q-header-list={headers}&q-url-param-list={params}&q-signature={signature}",
            id = self.secret_id,
            time = self.key_time,
            headers = self.header_list,
            params = self.param_list,
            signature = self.signature,
        )
    }
}

/// Signs requests with a credential pair.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: Credentials,
}

impl RequestSigner {
    /// Create a signer for the given credentials.
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Compute the signature for a request.
    ///
    /// The path is signed as it appears on the wire, percent-encoding
    /// included. Object keys are ASCII so this matches the decoded form for
    /// every key this crate writes.
    pub fn sign(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        scope: SignatureScope,
        key_time: KeyTime,
    ) -> Result<Signature, SignError> {
        let key_time_str = key_time.to_string();
        let sign_key = hmac_sha1_hex(
            self.credentials.secret_key.revealed().as_bytes(),
            key_time_str.as_bytes(),
        );

        let query = CanonicalPairs::query(uri)?;
        let headers = CanonicalPairs::headers(headers, scope)?;

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n",
            method.as_str().to_lowercase(),
            uri.path(),
            query.pairs(),
            headers.pairs()
        );
        tracing::trace!(%canonical_request, "canonical request");

        let string_to_sign = format!(
            "sha1\n{key_time_str}\n{}\n",
            sha1_hex(canonical_request.as_bytes())
        );
        let signature = hmac_sha1_hex(sign_key.as_bytes(), string_to_sign.as_bytes());

        Ok(Signature {
            secret_id: self.credentials.secret_id.clone(),
            key_time,
            header_list: headers.keys,
            param_list: query.keys,
            signature,
        })
    }

    /// Set the `Host`, `Date` and `Authorization` headers on a request.
    ///
    /// The request must not be modified after signing.
    pub fn authorize<B>(&self, req: &mut http::Request<B>) -> Result<(), SignError> {
        self.authorize_at(req, Utc::now())
    }

    /// Like [`RequestSigner::authorize`], at a fixed instant.
    pub fn authorize_at<B>(
        &self,
        req: &mut http::Request<B>,
        now: DateTime<Utc>,
    ) -> Result<(), SignError> {
        let host = req
            .uri()
            .host()
            .ok_or_else(|| SignError::MissingHost(req.uri().clone()))?;
        let host = HeaderValue::from_str(host)?;

        let headers = req.headers_mut();
        headers.insert(header::HOST, host);
        headers.insert(header::DATE, HeaderValue::from_str(&http_date(now))?);

        let signature = self.sign(
            req.method(),
            req.uri(),
            req.headers(),
            SignatureScope::Headers,
            KeyTime::starting_at(now),
        )?;

        let mut value = HeaderValue::try_from(signature.to_string())?;
        value.set_sensitive(true);
        req.headers_mut().insert(header::AUTHORIZATION, value);
        Ok(())
    }

    /// Produce a presigned URL for `method` on `uri`.
    pub fn presign(&self, method: &Method, uri: &Uri) -> Result<Uri, SignError> {
        self.presign_at(method, uri, Utc::now())
    }

    /// Like [`RequestSigner::presign`], at a fixed instant.
    pub fn presign_at(
        &self,
        method: &Method,
        uri: &Uri,
        now: DateTime<Utc>,
    ) -> Result<Uri, SignError> {
        let signature = self.sign(
            method,
            uri,
            &HeaderMap::new(),
            SignatureScope::QueryOnly,
            KeyTime::starting_at(now),
        )?;

        let separator = match uri.query() {
            Some(query) if !query.is_empty() => '&',
            _ => '?',
        };
        Ok(format!("{uri}{separator}{signature}").parse()?)
    }
}
