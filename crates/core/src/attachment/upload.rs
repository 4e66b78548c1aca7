//! Pending upload handles.

use async_trait::async_trait;
use bytes::Bytes;

use crate::storage::{StorageDriver, StorageError};

use super::detect::detect;
use super::naming::sanitize_extname;

/// MIME type used when nothing better is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// A file received from a client that has not been stored yet.
#[async_trait]
pub trait UploadedFile: std::fmt::Debug + Send + Sync {
    /// File name as sent by the client.
    fn client_name(&self) -> Option<&str>;

    /// Extension without the leading dot.
    fn extname(&self) -> &str;

    /// `type/subtype` MIME type.
    fn mime_type(&self) -> &str;

    /// Size in bytes.
    fn size(&self) -> u64;

    /// Write the file to `disk` under `key`.
    async fn move_to_disk(&self, key: &str, disk: &dyn StorageDriver) -> Result<(), StorageError>;
}

/// An uploaded file buffered in memory, e.g. one multipart field.
#[derive(Debug, Clone)]
pub struct MultipartFile {
    field_name: String,
    client_name: Option<String>,
    extname: String,
    mime_type: String,
    data: Bytes,
}

impl MultipartFile {
    /// Create a file from a multipart field.
    ///
    /// The extension comes from the client name, falling back to the
    /// detected type. The MIME type comes from the declared content type,
    /// falling back to the detected type.
    #[must_use]
    pub fn new(
        field_name: impl Into<String>,
        client_name: Option<String>,
        content_type: Option<String>,
        data: Bytes,
    ) -> Self {
        let detected = detect(&data).ok();

        let extname = client_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| sanitize_extname(ext))
            .filter(|ext| !ext.is_empty())
            .or_else(|| detected.as_ref().map(|d| d.extname.clone()))
            .unwrap_or_default();

        let mime_type = content_type
            .filter(|ct| ct.contains('/'))
            .or_else(|| detected.map(|d| d.mime_type))
            .unwrap_or_else(|| OCTET_STREAM.to_string());

        Self {
            field_name: field_name.into(),
            client_name,
            extname,
            mime_type,
            data,
        }
    }

    /// Form field the file arrived in.
    #[must_use]
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Raw contents.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

#[async_trait]
impl UploadedFile for MultipartFile {
    fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    fn extname(&self) -> &str {
        &self.extname
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn move_to_disk(&self, key: &str, disk: &dyn StorageDriver) -> Result<(), StorageError> {
        disk.put(key, self.data.clone()).await
    }
}
