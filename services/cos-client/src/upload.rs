use std::future::Future;
use std::io::SeekFrom;
use std::sync::OnceLock;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use blob_storage::{BlobSource, CancellationToken};
use bytes::Bytes;
use http::{Method, Uri};
use md5::{Digest as _, Md5};
use serde::Deserialize;
use tokio::io::{AsyncReadExt as _, AsyncSeekExt as _};

use crate::bounded::BoundedReader;
use crate::config::ConfigError;
use crate::errors::{CosRequestError, CosResponseExt as _};
use crate::retry::RetryPolicy;
use crate::signer::cos_encode;
use crate::{xml, CosClient};

/// Upload tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct UploadSettings {
    /// Content at least this long is uploaded in parts of this size.
    pub part_size: u64,

    /// Number of parts uploaded concurrently.
    pub batch_size: usize,

    /// Attempts per object or part, including the first.
    pub attempts: usize,

    /// Pause between attempts, in seconds.
    pub backoff_seconds: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            part_size: crate::COS_PART_SIZE,
            batch_size: crate::COS_UPLOAD_BATCH_SIZE,
            attempts: crate::COS_UPLOAD_ATTEMPTS,
            backoff_seconds: crate::COS_RETRY_BACKOFF.as_secs(),
        }
    }
}

impl UploadSettings {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.part_size == 0 {
            return Err(ConfigError::InvalidUpload("part-size must be positive"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidUpload("batch-size must be positive"));
        }
        if self.attempts == 0 {
            return Err(ConfigError::InvalidUpload("attempts must be positive"));
        }
        Ok(())
    }

    /// The retry policy for a single object or part.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_secs(self.backoff_seconds))
    }
}

/// One part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDescriptor {
    /// 1-based part number.
    pub number: usize,

    /// Offset of the part within the content.
    pub offset: u64,

    /// Length of the part.
    pub length: u64,

    /// Base64 MD5 of the part, once it has been read.
    pub content_md5: Option<String>,

    /// The ETag returned for the part, once uploaded.
    pub etag: Option<String>,
}

/// Split `len` bytes into parts of `part_size`; the last part may be shorter.
pub fn parts_for(len: u64, part_size: u64) -> Vec<PartDescriptor> {
    let part_size = part_size.max(1);
    let count = len.div_ceil(part_size);

    (0..count)
        .map(|index| {
            let offset = index * part_size;
            PartDescriptor {
                number: index as usize + 1,
                offset,
                length: part_size.min(len - offset),
                content_md5: None,
                etag: None,
            }
        })
        .collect()
}

/// A multipart upload in progress on the object store.
#[derive(Debug)]
pub struct UploadSession {
    upload_id: String,
    uri: Uri,
    parts: Vec<PartDescriptor>,
}

impl UploadSession {
    /// The opaque upload id assigned by the object store.
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    /// The parts of this upload.
    pub fn parts(&self) -> &[PartDescriptor] {
        &self.parts
    }

    fn uri_with(&self, query: &str) -> Result<Uri, CosRequestError> {
        Ok(format!("{}?{query}", self.uri).parse()?)
    }
}

/// A failed upload, with the error from aborting the multipart session if
/// that failed too.
#[derive(Debug)]
pub(crate) struct UploadError {
    pub(crate) error: CosRequestError,
    pub(crate) abort: Option<CosRequestError>,
}

impl From<CosRequestError> for UploadError {
    fn from(error: CosRequestError) -> Self {
        UploadError { error, abort: None }
    }
}

/// Base64 MD5, as sent in `Content-MD5`.
pub(crate) fn content_md5(data: &[u8]) -> String {
    STANDARD.encode(Md5::digest(data))
}

async fn cancellable<T, F>(cancel: &CancellationToken, operation: F) -> Result<T, CosRequestError>
where
    F: Future<Output = Result<T, CosRequestError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CosRequestError::Cancelled),
        result = operation => result,
    }
}

impl CosClient {
    /// Upload `content` to `uri`, in parts if it is large.
    pub(crate) async fn upload(
        &self,
        content: &dyn BlobSource,
        uri: &Uri,
        cancel: &CancellationToken,
    ) -> Result<(), UploadError> {
        if content.len() < self.uploads.part_size {
            tracing::debug!(length = content.len(), "uploading as a single object");
            self.put_object(content, uri, cancel).await?;
            Ok(())
        } else {
            tracing::debug!(length = content.len(), "uploading in parts");
            self.upload_multipart(content, uri, cancel).await
        }
    }

    #[tracing::instrument(skip_all, fields(%uri))]
    async fn put_object(
        &self,
        content: &dyn BlobSource,
        uri: &Uri,
        cancel: &CancellationToken,
    ) -> Result<(), CosRequestError> {
        let md5 = OnceLock::new();
        let policy = self.uploads.retry_policy();

        policy
            .run(|attempt| {
                cancellable(cancel, self.put_object_attempt(content, uri, &md5, attempt))
            })
            .await?;

        tracing::info!(length = content.len(), "uploaded object");
        Ok(())
    }

    async fn put_object_attempt(
        &self,
        content: &dyn BlobSource,
        uri: &Uri,
        md5: &OnceLock<String>,
        attempt: usize,
    ) -> Result<(), CosRequestError> {
        tracing::trace!(%attempt, "uploading object");

        let mut handle = content.open().await?;
        let mut body = Vec::with_capacity(content.len() as usize);
        handle.read_to_end(&mut body).await?;
        drop(handle);

        let md5 = md5.get_or_init(|| content_md5(&body));
        let req = self.signed_request(
            Method::PUT,
            uri.clone(),
            Some(crate::OCTET_STREAM),
            Some(md5),
            Some(Bytes::from(body)),
        )?;

        self.client.execute(req).await?.handle_errors().await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(%uri))]
    async fn upload_multipart(
        &self,
        content: &dyn BlobSource,
        uri: &Uri,
        cancel: &CancellationToken,
    ) -> Result<(), UploadError> {
        let upload_id = cancellable(cancel, self.initiate_multipart(uri)).await?;

        let mut session = UploadSession {
            upload_id,
            uri: uri.clone(),
            parts: parts_for(content.len(), self.uploads.part_size),
        };
        tracing::debug!(
            upload_id = %session.upload_id,
            parts = session.parts.len(),
            "initiated multipart upload"
        );

        match self.upload_parts_and_complete(content, &mut session, cancel).await {
            Ok(()) => {
                tracing::info!(
                    upload_id = %session.upload_id,
                    parts = session.parts.len(),
                    "completed multipart upload"
                );
                Ok(())
            }
            Err(error) => {
                tracing::warn!(upload_id = %session.upload_id, %error, "multipart upload failed, aborting");
                let abort = self.abort_multipart(&session).await.err();
                if let Some(abort) = &abort {
                    tracing::error!(
                        upload_id = %session.upload_id,
                        error = %abort,
                        "failed to abort multipart upload, the session may be left on the server"
                    );
                }
                Err(UploadError { error, abort })
            }
        }
    }

    async fn upload_parts_and_complete(
        &self,
        content: &dyn BlobSource,
        session: &mut UploadSession,
        cancel: &CancellationToken,
    ) -> Result<(), CosRequestError> {
        let upload_id = session.upload_id.as_str();
        let uri = &session.uri;

        for batch in session.parts.chunks_mut(self.uploads.batch_size) {
            let uploads = batch
                .iter()
                .map(|part| self.upload_part(content, uri, upload_id, part, cancel));
            let results = futures::future::join_all(uploads).await;

            for (part, result) in batch.iter_mut().zip(results) {
                let (etag, md5) = result?;
                part.etag = Some(etag);
                part.content_md5 = Some(md5);
            }
        }

        cancellable(cancel, self.complete_multipart(session)).await
    }

    #[tracing::instrument(skip_all, fields(%uri))]
    async fn initiate_multipart(&self, uri: &Uri) -> Result<String, CosRequestError> {
        let req = self.signed_request(
            Method::POST,
            format!("{uri}?uploads").parse()?,
            Some(crate::OCTET_STREAM),
            None,
            Some(Bytes::new()),
        )?;

        let response = self.client.execute(req).await?.handle_errors().await?;
        let body = response.text().await?;

        match xml::element(&body, "UploadId") {
            Some(upload_id) if !upload_id.is_empty() => Ok(upload_id.to_owned()),
            _ => Err(CosRequestError::Protocol(
                "initiate response has no UploadId".into(),
            )),
        }
    }

    #[tracing::instrument("part", skip_all, fields(part = part.number))]
    async fn upload_part(
        &self,
        content: &dyn BlobSource,
        uri: &Uri,
        upload_id: &str,
        part: &PartDescriptor,
        cancel: &CancellationToken,
    ) -> Result<(String, String), CosRequestError> {
        let uri: Uri = format!(
            "{uri}?partNumber={}&uploadId={}",
            part.number,
            cos_encode(upload_id)
        )
        .parse()?;
        let md5 = OnceLock::new();
        let policy = self.uploads.retry_policy();

        let etag = policy
            .run(|attempt| {
                cancellable(cancel, self.upload_part_attempt(content, &uri, part, &md5, attempt))
            })
            .await?;

        let md5 = md5.into_inner().unwrap_or_default();
        Ok((etag, md5))
    }

    async fn upload_part_attempt(
        &self,
        content: &dyn BlobSource,
        uri: &Uri,
        part: &PartDescriptor,
        md5: &OnceLock<String>,
        attempt: usize,
    ) -> Result<String, CosRequestError> {
        tracing::trace!(%attempt, offset = part.offset, length = part.length, "uploading part");

        let mut handle = content.open().await?;
        handle.seek(SeekFrom::Start(part.offset)).await?;
        let mut view = BoundedReader::new(handle, part.length).await?;

        let mut body = Vec::with_capacity(view.len() as usize);
        view.read_to_end(&mut body).await?;
        drop(view);

        let md5 = md5.get_or_init(|| content_md5(&body));
        let req = self.signed_request(
            Method::PUT,
            uri.clone(),
            Some(crate::OCTET_STREAM),
            Some(md5),
            Some(Bytes::from(body)),
        )?;

        let response = self.client.execute(req).await?.handle_errors().await?;
        match response.header_str(http::header::ETAG) {
            Some(etag) if !etag.is_empty() => Ok(etag.to_owned()),
            _ => Err(CosRequestError::Protocol(format!(
                "part {} response has no ETag",
                part.number
            ))),
        }
    }

    #[tracing::instrument(skip_all, fields(upload_id = %session.upload_id))]
    async fn complete_multipart(&self, session: &UploadSession) -> Result<(), CosRequestError> {
        let parts = session
            .parts
            .iter()
            .map(|part| {
                part.etag
                    .as_deref()
                    .map(|etag| (part.number, etag))
                    .ok_or_else(|| {
                        CosRequestError::Protocol(format!("part {} was not uploaded", part.number))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let body = xml::complete_multipart_upload(parts);
        let md5 = content_md5(body.as_bytes());
        let req = self.signed_request(
            Method::POST,
            session.uri_with(&format!("uploadId={}", cos_encode(&session.upload_id)))?,
            Some("application/xml"),
            Some(&md5),
            Some(Bytes::from(body)),
        )?;

        self.client.execute(req).await?.handle_errors().await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(upload_id = %session.upload_id))]
    async fn abort_multipart(&self, session: &UploadSession) -> Result<(), CosRequestError> {
        let req = self.signed_request(
            Method::DELETE,
            session.uri_with(&format!("uploadId={}", cos_encode(&session.upload_id)))?,
            None,
            None,
            None,
        )?;

        self.client.execute(req).await?.handle_errors().await?;
        tracing::debug!("aborted multipart upload");
        Ok(())
    }
}
