//! Content-addressed blob storage for a container registry.
//!
//! This crate holds the backend-neutral pieces: digests and the object keys
//! derived from them, the content sources handed to an upload, and the
//! [`BlobStorage`] contract implemented by concrete object-store backends.

mod digest;
mod error;
mod source;
mod storage;

pub use digest::{Digest, DigestError, ObjectKey};
pub use error::{BlobStorageError, BlobStorageErrorBuilder, BlobStorageErrorKind};
pub use source::{AsyncReadSeek, BlobSource, FileSource};
pub use storage::{BlobReader, BlobStorage};
pub use tokio_util::sync::CancellationToken;
