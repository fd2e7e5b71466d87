use std::fmt;
use std::sync::Arc;

use api_client::{ApiClient, ClientTimeouts};
use blob_storage::{
    BlobReader, BlobSource, BlobStorage, BlobStorageError, BlobStorageErrorBuilder,
    BlobStorageErrorKind, CancellationToken, Digest, ObjectKey,
};
use bytes::Bytes;
use futures::TryStreamExt as _;
use http::header::{self, HeaderValue};
use http::{Method, StatusCode, Uri};
use http_body_util::BodyExt as _;
use tokio_util::io::StreamReader;

use crate::config::CosConfig;
use crate::download::{CdnSigner, NonceSource};
use crate::errors::{CosRequestError, CosResponseExt as _};
use crate::key::ObjectLocator;
use crate::signer::RequestSigner;
use crate::upload::{UploadError, UploadSettings};
use crate::COS_STORAGE_NAME;

fn storage_error(error: CosRequestError) -> BlobStorageErrorBuilder {
    BlobStorageError::builder(COS_STORAGE_NAME, error.kind(), error)
}

/// A [`BlobStorage`] backed by a COS bucket.
#[derive(Clone)]
pub struct CosClient {
    pub(crate) client: ApiClient,
    signer: RequestSigner,
    locator: ObjectLocator,
    cdn: Option<CdnSigner>,
    pub(crate) uploads: UploadSettings,
}

impl fmt::Debug for CosClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CosClient")
            .field("locator", &self.locator)
            .field("cdn", &self.cdn.is_some())
            .field("uploads", &self.uploads)
            .finish()
    }
}

impl CosClient {
    /// Create a client with its own connection pool.
    pub fn new(config: CosConfig) -> Result<Self, BlobStorageError> {
        let client = ApiClient::new(ClientTimeouts {
            connect: crate::COS_CONNECT_TIMEOUT,
            request: crate::COS_REQUEST_TIMEOUT,
        });
        Self::with_client(config, client)
    }

    /// Create a client over an existing [`ApiClient`].
    pub fn with_client(config: CosConfig, client: ApiClient) -> Result<Self, BlobStorageError> {
        let config = config.validate().map_err(BlobStorageError::with(
            COS_STORAGE_NAME,
            BlobStorageErrorKind::Configuration,
        ))?;

        let locator = ObjectLocator::new(
            &config.service_url,
            config.accelerated_upload_url.as_deref(),
        );
        let cdn = config.cdn.as_ref().and_then(CdnSigner::from_config);
        tracing::debug!(
            service = %config.service_url,
            accelerated = config.accelerated_upload_url.is_some(),
            cdn = cdn.is_some(),
            "configured COS storage"
        );

        Ok(Self {
            client,
            signer: RequestSigner::new(config.credentials),
            locator,
            cdn,
            uploads: config.upload,
        })
    }

    /// Replace the source of CDN signature nonces.
    pub fn with_nonce_source(mut self, nonce: Arc<dyn NonceSource>) -> Self {
        if let Some(cdn) = self.cdn.as_mut() {
            cdn.set_nonce_source(nonce);
        }
        self
    }

    /// The upload settings in effect.
    pub fn upload_settings(&self) -> &UploadSettings {
        &self.uploads
    }

    /// Build an authorized request. `Content-Length` is set whenever there is
    /// a body.
    pub(crate) fn signed_request(
        &self,
        method: Method,
        uri: Uri,
        content_type: Option<&str>,
        content_md5: Option<&str>,
        body: Option<Bytes>,
    ) -> Result<http::Request<hyperdriver::Body>, CosRequestError> {
        let mut builder = http::Request::builder().method(method).uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        if let Some(md5) = content_md5 {
            builder = builder.header("content-md5", md5);
        }

        let mut req = match body {
            Some(body) => builder
                .header(header::CONTENT_LENGTH, HeaderValue::from(body.len()))
                .body(hyperdriver::Body::from(body))?,
            None => builder.body(hyperdriver::Body::empty())?,
        };

        self.signer.authorize(&mut req)?;
        Ok(req)
    }

    async fn lookup(&self, digest: &Digest) -> Result<Option<ObjectKey>, CosRequestError> {
        let (key, uri) = self.locator.resolve(digest)?;
        let req = self.signed_request(Method::HEAD, uri.clone(), None, None, None)?;
        let response = self.client.execute(req).await?;

        tracing::debug!(%uri, status = %response.status(), "looked up blob");
        match response.status() {
            status if status.is_success() => Ok(Some(key)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(response
                .handle_errors()
                .await
                .err()
                .unwrap_or_else(|| CosRequestError::Protocol("unexpected lookup status".into()))),
        }
    }

    async fn fetch(&self, location: &ObjectKey) -> Result<BlobReader, CosRequestError> {
        let uri = self
            .signer
            .presign(&Method::GET, &self.locator.service_uri(location)?)?;
        let req = http::Request::get(uri).body(hyperdriver::Body::empty())?;

        let response = self.client.execute(req).await?.handle_errors().await?;
        let stream = response
            .into_body()
            .into_data_stream()
            .map_err(std::io::Error::other);

        Ok(Box::pin(StreamReader::new(stream)))
    }

    async fn remove(&self, location: &ObjectKey) -> Result<(), CosRequestError> {
        let uri = self.locator.service_uri(location)?;
        let req = self.signed_request(Method::DELETE, uri, None, None, None)?;
        self.client.execute(req).await?.handle_errors().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlobStorage for CosClient {
    fn name(&self) -> &'static str {
        COS_STORAGE_NAME
    }

    #[tracing::instrument(skip(self), fields(%digest))]
    async fn try_locate_existing(
        &self,
        digest: &Digest,
    ) -> Result<Option<ObjectKey>, BlobStorageError> {
        self.lookup(digest).await.map_err(|error| {
            storage_error(error)
                .location(ObjectKey::from(digest).as_str())
                .context("locate")
                .build()
        })
    }

    #[tracing::instrument(skip(self, cancel), fields(%location))]
    async fn read(
        &self,
        location: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<BlobReader, BlobStorageError> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CosRequestError::Cancelled),
            result = self.fetch(location) => result,
        };

        result.map_err(|error| {
            storage_error(error)
                .location(location.as_str())
                .context("read")
                .build()
        })
    }

    #[tracing::instrument(skip(self), fields(%location))]
    async fn delete(&self, location: &ObjectKey) -> Result<(), BlobStorageError> {
        self.remove(location).await.map_err(|error| {
            storage_error(error)
                .location(location.as_str())
                .context("delete")
                .build()
        })?;

        tracing::info!("deleted blob");
        Ok(())
    }

    #[tracing::instrument(skip(self, content, cancel), fields(%digest, %repository, length = content.len()))]
    async fn save(
        &self,
        content: &dyn BlobSource,
        digest: &Digest,
        repository: &str,
        cancel: &CancellationToken,
    ) -> Result<ObjectKey, BlobStorageError> {
        let (key, uri) = self.locator.resolve(digest).map_err(|error| {
            storage_error(error.into())
                .location(digest.as_str())
                .context("save")
                .build()
        })?;

        self.upload(content, &uri, cancel)
            .await
            .map_err(|UploadError { error, abort }| {
                storage_error(error)
                    .location(key.as_str())
                    .context("save")
                    .cleanup_failure(abort)
                    .build()
            })?;

        tracing::info!(location = %key, "saved blob");
        Ok(key)
    }

    fn supports_downloading(&self) -> bool {
        true
    }

    fn download_url(&self, location: &ObjectKey) -> Result<Uri, BlobStorageError> {
        let uri = match &self.cdn {
            Some(cdn) => cdn.sign(location).map_err(CosRequestError::from),
            None => self
                .locator
                .service_uri(location)
                .map_err(CosRequestError::from)
                .and_then(|uri| Ok(self.signer.presign(&Method::GET, &uri)?)),
        };

        uri.map_err(|error| {
            storage_error(error)
                .location(location.as_str())
                .context("download url")
                .build()
        })
    }
}
