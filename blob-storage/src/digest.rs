use std::fmt;
use std::str::FromStr;

use sha2::Digest as _;
use thiserror::Error;

/// A digest string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
    /// No `:` separates the algorithm from the hash.
    #[error("digest {0:?} is missing the algorithm separator")]
    MissingSeparator(String),

    /// The algorithm component is empty or contains invalid characters.
    #[error("digest {0:?} has an invalid algorithm")]
    InvalidAlgorithm(String),

    /// The hash component is shorter than the two characters used for sharding,
    /// or is not lowercase hex.
    #[error("digest {0:?} has an invalid hex component")]
    InvalidHex(String),
}

/// A content digest of the form `<algorithm>:<hex>`.
///
/// The hex component must be lowercase, as registries write it. Uppercase
/// digits are rejected so that one piece of content maps to exactly one
/// object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    value: String,
    separator: usize,
}

impl Digest {
    /// Parse and validate a digest string.
    pub fn parse(value: &str) -> Result<Self, DigestError> {
        let Some((algorithm, hex)) = value.split_once(':') else {
            return Err(DigestError::MissingSeparator(value.to_owned()));
        };

        let valid_algorithm = !algorithm.is_empty()
            && algorithm.bytes().all(|b| {
                b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'+' | b'.' | b'_' | b'-')
            });
        if !valid_algorithm {
            return Err(DigestError::InvalidAlgorithm(value.to_owned()));
        }

        let valid_hex = hex.len() >= 2
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid_hex {
            return Err(DigestError::InvalidHex(value.to_owned()));
        }

        Ok(Self {
            value: value.to_owned(),
            separator: algorithm.len(),
        })
    }

    /// Compute the `sha256` digest of some content.
    pub fn of_sha256(content: &[u8]) -> Self {
        let hash = sha2::Sha256::digest(content);
        Self {
            value: format!("sha256:{}", hex::encode(hash)),
            separator: "sha256".len(),
        }
    }

    /// The hash algorithm, e.g. `sha256`.
    pub fn algorithm(&self) -> &str {
        &self.value[..self.separator]
    }

    /// The hex-encoded hash.
    pub fn hex(&self) -> &str {
        &self.value[self.separator + 1..]
    }

    /// The full `<algorithm>:<hex>` form.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// The storage key for content with this digest.
    pub fn object_key(&self) -> ObjectKey {
        ObjectKey::from(self)
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Digest::parse(s)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// The sharded storage path for a blob: `<algorithm>/<hex[..2]>/<hex>`.
///
/// Also used as the opaque "location" handed back to callers of
/// [`crate::BlobStorage::save`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Wrap a location previously returned by a storage backend.
    pub fn new(location: impl Into<String>) -> Self {
        let location: String = location.into();
        ObjectKey(location.trim_start_matches('/').to_owned())
    }

    /// The key as a relative path (no leading `/`).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Digest> for ObjectKey {
    fn from(digest: &Digest) -> Self {
        let hex = digest.hex();
        ObjectKey(format!("{}/{}/{}", digest.algorithm(), &hex[..2], hex))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
