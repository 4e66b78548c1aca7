//! HMAC signing for disks that cannot presign URLs themselves.
//!
//! A signed URL looks like `{url}?expires={unix}&signature={sig}` where `sig`
//! is the URL-safe base64 HMAC-SHA256 of `"{key}\n{expires}"`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::error::StorageError;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies object URLs.
#[derive(Clone)]
pub struct UrlSigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

impl UrlSigner {
    /// Create a signer from a secret.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, StorageError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(StorageError::configuration("URL signing key is empty"));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| StorageError::configuration(e.to_string()))?;
        Ok(Self { mac })
    }

    fn payload_mac(&self, key: &str, expires_at: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires_at.to_string().as_bytes());
        mac
    }

    /// Signature for `key` valid until `expires_at` (unix seconds).
    #[must_use]
    pub fn sign(&self, key: &str, expires_at: i64) -> String {
        let digest = self.payload_mac(key, expires_at).finalize().into_bytes();
        base64_url::encode(&digest)
    }

    /// Append the signature query to an object URL.
    #[must_use]
    pub fn signed_url(&self, url: &str, key: &str, expires_at: i64) -> String {
        let separator = if url.contains('?') { '&' } else { '?' };
        format!(
            "{url}{separator}expires={expires_at}&signature={}",
            self.sign(key, expires_at)
        )
    }

    /// Check a signature against `key` and the current time `now`.
    #[must_use]
    pub fn verify(&self, key: &str, expires_at: i64, signature: &str, now: i64) -> bool {
        if expires_at < now {
            return false;
        }
        let Ok(raw) = base64_url::decode(signature) else {
            return false;
        };
        self.payload_mac(key, expires_at).verify_slice(&raw).is_ok()
    }
}
