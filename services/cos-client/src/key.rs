use blob_storage::{Digest, ObjectKey};
use http::Uri;

/// Maps digests and locations to absolute object URIs.
#[derive(Debug, Clone)]
pub struct ObjectLocator {
    service: String,
    upload: String,
}

impl ObjectLocator {
    /// Create a locator from base URLs, which must not end in `/`.
    ///
    /// Uploads and existence checks go to `accelerated` when it is set.
    pub fn new(service: &str, accelerated: Option<&str>) -> Self {
        Self {
            service: service.to_owned(),
            upload: accelerated.unwrap_or(service).to_owned(),
        }
    }

    /// The object key and upload URI for content with `digest`.
    pub fn resolve(&self, digest: &Digest) -> Result<(ObjectKey, Uri), http::uri::InvalidUri> {
        let key = ObjectKey::from(digest);
        let uri = join(&self.upload, &key)?;
        Ok((key, uri))
    }

    /// The URI of an existing object on the primary service.
    pub fn service_uri(&self, location: &ObjectKey) -> Result<Uri, http::uri::InvalidUri> {
        join(&self.service, location)
    }
}

fn join(base: &str, key: &ObjectKey) -> Result<Uri, http::uri::InvalidUri> {
    format!("{base}/{key}").parse()
}
