use std::fmt;
use std::pin::Pin;

use http::Uri;
use tokio::io::AsyncBufRead;
use tokio_util::sync::CancellationToken;

use crate::digest::{Digest, ObjectKey};
use crate::error::BlobStorageError;
use crate::source::BlobSource;

/// A streaming reader over a stored blob.
pub type BlobReader = Pin<Box<dyn AsyncBufRead + Send>>;

/// Content-addressed blob storage, as consumed by the registry's blob
/// endpoints and by pull-through synchronization.
#[async_trait::async_trait]
pub trait BlobStorage: fmt::Debug + Send + Sync {
    /// The name of the storage backend.
    fn name(&self) -> &'static str;

    /// Find the location of an existing blob by digest.
    ///
    /// Returns `Ok(None)` when the backend reports no such blob.
    async fn try_locate_existing(
        &self,
        digest: &Digest,
    ) -> Result<Option<ObjectKey>, BlobStorageError>;

    /// Stream the blob stored at `location`.
    async fn read(
        &self,
        location: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<BlobReader, BlobStorageError>;

    /// Delete the blob stored at `location`.
    async fn delete(&self, location: &ObjectKey) -> Result<(), BlobStorageError>;

    /// Save `content` under the key derived from `digest`, returning its location.
    ///
    /// The digest is trusted; it is not recomputed from the content.
    async fn save(
        &self,
        content: &dyn BlobSource,
        digest: &Digest,
        repository: &str,
        cancel: &CancellationToken,
    ) -> Result<ObjectKey, BlobStorageError>;

    /// Whether clients may download blobs directly from the backend.
    fn supports_downloading(&self) -> bool;

    /// A URL from which a client can download the blob at `location`.
    fn download_url(&self, location: &ObjectKey) -> Result<Uri, BlobStorageError>;
}
