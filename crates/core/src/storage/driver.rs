//! Storage driver trait definition.
//!
//! Every disk on the [`Drive`](super::Drive) is reached through this trait, so
//! attachments never know which backend (filesystem, object store, memory)
//! holds their bytes.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::config::Visibility;
use super::error::StorageError;
use super::signer::UrlSigner;

/// Options for signed URL generation.
#[derive(Debug, Clone, Default)]
pub struct SignedUrlOptions {
    /// How long the URL stays valid. Defaults to the disk's configured TTL.
    pub expires_in: Option<Duration>,
    /// `Content-Type` the backend should answer with.
    pub content_type: Option<String>,
    /// `Content-Disposition` the backend should answer with.
    pub content_disposition: Option<String>,
}

impl SignedUrlOptions {
    /// Options with an explicit expiry.
    #[must_use]
    pub fn expires_in(duration: Duration) -> Self {
        Self {
            expires_in: Some(duration),
            ..Self::default()
        }
    }
}

/// Storage driver for pluggable disks.
///
/// Keys are relative, `/`-separated paths such as `avatars/cat-<id>.jpg`.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Name the disk is registered under.
    fn name(&self) -> &str;

    /// Write an object, replacing any previous content under `key`.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StorageError>;

    /// Read a whole object.
    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Check if an object exists.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Unsigned URL for an object.
    async fn url(&self, key: &str) -> Result<String, StorageError>;

    /// Time-limited URL for an object.
    async fn signed_url(&self, key: &str, options: &SignedUrlOptions)
    -> Result<String, StorageError>;

    /// Visibility of an object.
    async fn visibility(&self, key: &str) -> Result<Visibility, StorageError>;

    /// Signer used for locally signed URLs, if the disk produces them.
    fn signer(&self) -> Option<&UrlSigner> {
        None
    }
}
