//! Blob storage on Tencent Cloud Object Storage (COS).
//!
//! [`CosClient`] implements [`blob_storage::BlobStorage`] on a COS bucket.
//! Blobs are stored under `{algorithm}/{first two hex digits}/{hex}`. Uploads
//! are signed with the COS HMAC-SHA1 scheme and large blobs go through the
//! multipart protocol in concurrent batches. Downloads are served either from
//! presigned bucket URLs or from a CDN with type-A URL authentication.

use std::time::Duration;

mod bounded;
mod client;
mod config;
mod credentials;
mod download;
mod errors;
mod key;
mod retry;
mod signer;
mod upload;
mod xml;

pub use self::bounded::BoundedReader;
pub use self::client::CosClient;
pub use self::config::{CdnConfig, ConfigError, CosConfig};
pub use self::credentials::{Credentials, Secret};
pub use self::download::{NonceSource, RandomNonce};
pub use self::errors::{CosError, CosRequestError};
pub use self::key::ObjectLocator;
pub use self::retry::{RetryPolicy, Retryable};
pub use self::signer::{
    cos_encode, CanonicalPairs, KeyTime, RequestSigner, SignError, Signature, SignatureScope,
};
pub use self::upload::{parts_for, PartDescriptor, UploadSession, UploadSettings};

/// Engine name reported in storage errors.
pub const COS_STORAGE_NAME: &str = "cos";

/// Content at least this long is uploaded in parts of this size.
pub const COS_PART_SIZE: u64 = 10 * 1024 * 1024;

/// Number of parts uploaded at once.
pub const COS_UPLOAD_BATCH_SIZE: usize = 6;

/// Attempts per object or part, including the first.
pub const COS_UPLOAD_ATTEMPTS: usize = 3;

/// Pause between upload attempts.
pub const COS_RETRY_BACKOFF: Duration = Duration::from_secs(3);

/// Overall timeout for a single request.
pub const COS_REQUEST_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Timeout for establishing a connection.
pub const COS_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const OCTET_STREAM: &str = "application/octet-stream";
