//! Backend configuration.

use std::env::VarError;

use http::Uri;
use serde::Deserialize;
use thiserror::Error;

use crate::credentials::{Credentials, Secret};
use crate::upload::UploadSettings;

/// The configuration is unusable. Always raised when a client is constructed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is missing or blank.
    #[error("missing required setting {0}")]
    Missing(&'static str),

    /// A base URL is not an absolute http(s) URL.
    #[error("invalid {field} {value:?}: {reason}")]
    InvalidUrl {
        /// The setting name.
        field: &'static str,
        /// The configured value.
        value: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Upload tuning values are out of range.
    #[error("invalid upload setting: {0}")]
    InvalidUpload(&'static str),

    /// An environment variable could not be read.
    #[error("environment variable {0}: {1}")]
    Env(&'static str, #[source] VarError),
}

/// CDN download settings. Only active when both fields are set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CdnConfig {
    /// Base URL of the CDN domain.
    #[serde(default)]
    pub base_url: String,

    /// The type-A authentication key configured on the CDN.
    #[serde(default)]
    pub auth_key_type_a: Option<Secret>,
}

impl CdnConfig {
    fn is_complete(&self) -> bool {
        !self.base_url.trim().is_empty()
            && self
                .auth_key_type_a
                .as_ref()
                .is_some_and(|key| !key.is_blank())
    }
}

/// Configuration for a [`CosClient`](crate::CosClient).
///
/// ```toml
/// secret-id = "AKID..."
/// secret-key = "..."
/// service-url = "https://bucket-1250000000.cos.ap-beijing.myqcloud.com"
/// accelerated-upload-url = "https://bucket-1250000000.cos.accelerate.myqcloud.com"
///
/// [cdn]
/// base-url = "https://cdn.example.com"
/// auth-key-type-a = "..."
///
/// [upload]
/// batch-size = 6
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CosConfig {
    /// The access credentials.
    #[serde(flatten)]
    pub credentials: Credentials,

    /// Base URL of the bucket.
    pub service_url: String,

    /// Base URL used for uploads and existence checks, if different.
    #[serde(default)]
    pub accelerated_upload_url: Option<String>,

    /// CDN download settings.
    #[serde(default)]
    pub cdn: Option<CdnConfig>,

    /// Upload tuning.
    #[serde(default)]
    pub upload: UploadSettings,
}

impl CosConfig {
    /// Create a configuration with default upload settings and no CDN.
    pub fn new(credentials: Credentials, service_url: impl Into<String>) -> Self {
        Self {
            credentials,
            service_url: service_url.into(),
            accelerated_upload_url: None,
            cdn: None,
            upload: UploadSettings::default(),
        }
    }

    /// Read the configuration from `COS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        fn required(var: &'static str) -> Result<String, ConfigError> {
            std::env::var(var).map_err(|err| ConfigError::Env(var, err))
        }

        fn optional(var: &'static str) -> Result<Option<String>, ConfigError> {
            match std::env::var(var) {
                Ok(value) => Ok(Some(value)),
                Err(VarError::NotPresent) => Ok(None),
                Err(err) => Err(ConfigError::Env(var, err)),
            }
        }

        let credentials = Credentials::new(
            required("COS_SECRET_ID")?,
            Secret::from_env("COS_SECRET_KEY")
                .map_err(|err| ConfigError::Env("COS_SECRET_KEY", err))?,
        );

        let cdn = match (optional("COS_CDN_BASE_URL")?, optional("COS_CDN_AUTH_KEY")?) {
            (None, None) => None,
            (base_url, key) => Some(CdnConfig {
                base_url: base_url.unwrap_or_default(),
                auth_key_type_a: key.map(Secret::from),
            }),
        };

        Ok(Self {
            credentials,
            service_url: required("COS_SERVICE_URL")?,
            accelerated_upload_url: optional("COS_ACCELERATED_UPLOAD_URL")?,
            cdn,
            upload: UploadSettings::default(),
        })
    }

    /// Validate the configuration, trimming trailing `/` from base URLs and
    /// dropping an incomplete CDN section.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.credentials.secret_id.trim().is_empty() {
            return Err(ConfigError::Missing("secret-id"));
        }
        if self.credentials.secret_key.is_blank() {
            return Err(ConfigError::Missing("secret-key"));
        }

        self.service_url = base_url("service-url", &self.service_url)?;
        self.accelerated_upload_url = match self.accelerated_upload_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Some(base_url("accelerated-upload-url", url)?),
            _ => None,
        };

        self.cdn = match self.cdn.take() {
            Some(cdn) if cdn.is_complete() => Some(CdnConfig {
                base_url: base_url("cdn.base-url", &cdn.base_url)?,
                auth_key_type_a: cdn.auth_key_type_a,
            }),
            Some(_) => {
                tracing::warn!("CDN configuration is incomplete, serving downloads directly");
                None
            }
            None => None,
        };

        self.upload.validate()?;
        Ok(self)
    }
}

fn base_url(field: &'static str, value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::Missing(field));
    }

    let invalid = |reason: &str| ConfigError::InvalidUrl {
        field,
        value: value.to_owned(),
        reason: reason.to_owned(),
    };

    let uri: Uri = trimmed.parse().map_err(|err: http::uri::InvalidUri| invalid(&err.to_string()))?;
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => return Err(invalid("scheme must be http or https")),
    }
    if uri.host().is_none() {
        return Err(invalid("missing host"));
    }
    if uri.query().is_some() {
        return Err(invalid("base URLs cannot carry a query"));
    }

    Ok(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(service_url: &str) -> CosConfig {
        CosConfig::new(Credentials::new("AKIDexample", "secret"), service_url)
    }

    #[test]
    fn trailing_slashes_are_trimmed() {
        let mut config = config("https://bucket.cos.ap-beijing.myqcloud.com/");
        config.accelerated_upload_url = Some("https://bucket.cos.accelerate.myqcloud.com//".into());

        let config = config.validate().unwrap();
        assert_eq!(config.service_url, "https://bucket.cos.ap-beijing.myqcloud.com");
        assert_eq!(
            config.accelerated_upload_url.as_deref(),
            Some("https://bucket.cos.accelerate.myqcloud.com")
        );
    }

    #[test]
    fn missing_settings_are_fatal() {
        assert!(matches!(
            config("").validate(),
            Err(ConfigError::Missing("service-url"))
        ));

        let mut no_id = config("https://bucket.cos.test");
        no_id.credentials.secret_id = String::new();
        assert!(matches!(
            no_id.validate(),
            Err(ConfigError::Missing("secret-id"))
        ));

        let mut no_key = config("https://bucket.cos.test");
        no_key.credentials.secret_key = Secret::from("");
        assert!(matches!(
            no_key.validate(),
            Err(ConfigError::Missing("secret-key"))
        ));
    }

    #[test]
    fn invalid_urls_are_fatal() {
        assert!(matches!(
            config("bucket.cos.test").validate(),
            Err(ConfigError::InvalidUrl { field: "service-url", .. })
        ));
        assert!(matches!(
            config("ftp://bucket.cos.test").validate(),
            Err(ConfigError::InvalidUrl { field: "service-url", .. })
        ));

        let mut accelerated = config("https://bucket.cos.test");
        accelerated.accelerated_upload_url = Some("not a url".into());
        assert!(matches!(
            accelerated.validate(),
            Err(ConfigError::InvalidUrl { field: "accelerated-upload-url", .. })
        ));
    }

    #[test]
    fn incomplete_cdn_is_ignored() {
        let mut config = config("https://bucket.cos.test");
        config.cdn = Some(CdnConfig {
            base_url: "https://cdn.example.com".into(),
            auth_key_type_a: None,
        });
        assert!(config.validate().unwrap().cdn.is_none());
    }

    #[test]
    fn complete_cdn_is_kept() {
        let mut config = config("https://bucket.cos.test");
        config.cdn = Some(CdnConfig {
            base_url: "https://cdn.example.com/".into(),
            auth_key_type_a: Some(Secret::from("cdnkey")),
        });
        let cdn = config.validate().unwrap().cdn.unwrap();
        assert_eq!(cdn.base_url, "https://cdn.example.com");
    }

    #[test]
    fn deserialize_from_toml() {
        let config: CosConfig = toml_edit::de::from_str(
            r#"
            secret-id = "AKIDexample"
            secret-key = "secret"
            service-url = "https://bucket.cos.test/"

            [cdn]
            base-url = "https://cdn.example.com"
            auth-key-type-a = "cdnkey"

            [upload]
            batch-size = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.credentials.secret_id, "AKIDexample");
        assert_eq!(config.upload.batch_size, 4);
        assert_eq!(config.upload.part_size, crate::COS_PART_SIZE);

        let config = config.validate().unwrap();
        assert_eq!(config.service_url, "https://bucket.cos.test");
        assert!(config.cdn.is_some());
    }
}
