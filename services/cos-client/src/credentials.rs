//! Access credentials for the object store.

use std::env::VarError;
use std::fmt;

use serde::Deserialize;
use zeroize::Zeroize;

/// A secret string which is redacted from debug output and zeroed on drop.
#[derive(Clone, Deserialize)]
#[serde(from = "String")]
pub struct Secret(String);

impl Secret {
    /// Read a secret from an environment variable.
    pub fn from_env(var: &str) -> Result<Self, VarError> {
        std::env::var(var).map(Secret)
    }

    /// Expose the underlying value.
    pub fn revealed(&self) -> &str {
        &self.0
    }

    /// Whether the secret is empty (or only whitespace).
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret(value.to_owned())
    }
}

/// A `SecretId` / `SecretKey` pair.
///
/// The id is sent in the clear as `q-ak`; the key only ever feeds the HMAC.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Credentials {
    /// The public key id.
    pub secret_id: String,

    /// The private signing key.
    pub secret_key: Secret,
}

impl Credentials {
    /// Create a credential pair.
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<Secret>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
        }
    }
}
