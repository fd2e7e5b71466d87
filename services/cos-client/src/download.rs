//! Download URLs served through a CDN with type-A URL authentication.

use std::fmt;
use std::sync::Arc;

use blob_storage::ObjectKey;
use chrono::{DateTime, Utc};
use http::Uri;
use md5::{Digest as _, Md5};

use crate::config::CdnConfig;
use crate::credentials::Secret;

/// Supplies the random component of CDN signatures.
pub trait NonceSource: fmt::Debug + Send + Sync {
    /// A fresh nonce. Must be URL-safe and must not contain `-`.
    fn nonce(&self) -> String;
}

/// 32 hex characters from a random UUID.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomNonce;

impl NonceSource for RandomNonce {
    fn nonce(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Signs CDN download URLs.
#[derive(Debug, Clone)]
pub(crate) struct CdnSigner {
    base_url: String,
    auth_key: Secret,
    nonce: Arc<dyn NonceSource>,
}

impl CdnSigner {
    /// Create a signer from a validated, complete CDN configuration.
    pub(crate) fn from_config(config: &CdnConfig) -> Option<Self> {
        let auth_key = config.auth_key_type_a.clone()?;
        Some(Self {
            base_url: config.base_url.clone(),
            auth_key,
            nonce: Arc::new(RandomNonce),
        })
    }

    pub(crate) fn set_nonce_source(&mut self, nonce: Arc<dyn NonceSource>) {
        self.nonce = nonce;
    }

    pub(crate) fn sign(&self, location: &ObjectKey) -> Result<Uri, http::uri::InvalidUri> {
        self.sign_at(location, Utc::now())
    }

    pub(crate) fn sign_at(
        &self,
        location: &ObjectKey,
        now: DateTime<Utc>,
    ) -> Result<Uri, http::uri::InvalidUri> {
        let timestamp = now.timestamp();
        let nonce = self.nonce.nonce();

        let string_to_sign = format!(
            "/{location}-{timestamp}-{nonce}-0-{}",
            self.auth_key.revealed()
        );
        let md5 = hex::encode(Md5::digest(string_to_sign.as_bytes()));

        format!(
            "{}/{location}?sign={timestamp}-{nonce}-0-{md5}",
            self.base_url
        )
        .parse()
    }
}
