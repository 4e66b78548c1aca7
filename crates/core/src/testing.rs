//! Shared test fixtures.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use crate::storage::{
    Disk, DiskConfig, Drive, SignedUrlOptions, StorageDriver, StorageError, StorageProvider,
    Visibility,
};

/// Smallest buffer detected as JPEG.
pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

/// Smallest buffer detected as PNG.
pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const APP_KEY: &str = "averylong32charsrandomsecretkey";

fn memory_disk(visibility: Visibility) -> Arc<dyn StorageDriver> {
    let config = DiskConfig::new(StorageProvider::Memory)
        .with_visibility(visibility)
        .with_url("/uploads");
    Arc::new(Disk::from_config("local", config, Some(APP_KEY)).expect("memory disk"))
}

/// Drive with a private memory disk named `local`.
pub fn memory_drive() -> Drive {
    Drive::new("local").with_driver("local", memory_disk(Visibility::Private))
}

/// Drive with a public memory disk named `local`.
pub fn public_memory_drive() -> Drive {
    Drive::new("local").with_driver("local", memory_disk(Visibility::Public))
}

/// Memory disk whose writes and deletes can be made to fail.
pub struct FlakyDisk {
    inner: Arc<dyn StorageDriver>,
    fail_put: AtomicBool,
    fail_delete: AtomicBool,
}

impl FlakyDisk {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: memory_disk(Visibility::Private),
            fail_put: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        })
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Drive with this disk as default.
    pub fn drive(self: &Arc<Self>) -> Drive {
        Drive::new("local").with_driver("local", Arc::clone(self) as Arc<dyn StorageDriver>)
    }
}

#[async_trait]
impl StorageDriver for FlakyDisk {
    fn name(&self) -> &str {
        "local"
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(StorageError::operation("put failed"));
        }
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StorageError::operation("delete failed"));
        }
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.inner.exists(key).await
    }

    async fn url(&self, key: &str) -> Result<String, StorageError> {
        self.inner.url(key).await
    }

    async fn signed_url(
        &self,
        key: &str,
        options: &SignedUrlOptions,
    ) -> Result<String, StorageError> {
        self.inner.signed_url(key, options).await
    }

    async fn visibility(&self, key: &str) -> Result<Visibility, StorageError> {
        self.inner.visibility(key).await
    }
}
