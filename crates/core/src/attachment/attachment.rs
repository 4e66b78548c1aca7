//! The attachment value.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::storage::{Drive, SignedUrlOptions, Visibility};

use super::detect::{BufferType, detect};
use super::error::AttachmentError;
use super::naming;
use super::types::{AttachmentAttributes, AttachmentJson, AttachmentOptions, PreComputeUrl};
use super::upload::UploadedFile;

/// Attributes a persisted representation must carry, in check order.
const REQUIRED_ATTRIBUTES: [&str; 4] = ["name", "size", "extname", "mimeType"];

#[derive(Debug, Clone)]
enum Source {
    File(Arc<dyn UploadedFile>),
    Buffer(Bytes),
}

/// A file bound to a record field.
///
/// Local values carry bytes waiting to be written; persisted values refer
/// to an object on a disk by `name`.
#[derive(Debug, Clone)]
pub struct Attachment {
    name: Option<String>,
    reserved_name: Option<String>,
    client_name: Option<String>,
    extname: String,
    mime_type: String,
    size: u64,
    url: Option<String>,
    is_local: bool,
    is_persisted: bool,
    is_deleted: bool,
    options: AttachmentOptions,
    source: Option<Source>,
}

impl Attachment {
    fn local(
        source: Source,
        client_name: Option<String>,
        extname: String,
        mime_type: String,
        size: u64,
    ) -> Self {
        Self {
            name: None,
            reserved_name: None,
            client_name,
            extname,
            mime_type,
            size,
            url: None,
            is_local: true,
            is_persisted: false,
            is_deleted: false,
            options: AttachmentOptions::default(),
            source: Some(source),
        }
    }

    /// Create a local attachment from an uploaded file.
    pub fn from_file(file: impl UploadedFile + 'static) -> Self {
        let file: Arc<dyn UploadedFile> = Arc::new(file);
        Self::local(
            Source::File(Arc::clone(&file)),
            file.client_name().map(str::to_string),
            file.extname().to_string(),
            file.mime_type().to_string(),
            file.size(),
        )
    }

    /// Create a local attachment from raw bytes, detecting the file type.
    pub fn from_buffer(
        data: impl Into<Bytes>,
        client_name: Option<&str>,
    ) -> Result<Self, AttachmentError> {
        Self::from_buffer_with(data, client_name, None)
    }

    /// Create a local attachment from raw bytes.
    ///
    /// An explicit `buffer_type` skips detection.
    pub fn from_buffer_with(
        data: impl Into<Bytes>,
        client_name: Option<&str>,
        buffer_type: Option<BufferType>,
    ) -> Result<Self, AttachmentError> {
        let data = data.into();
        let BufferType { extname, mime_type } = match buffer_type {
            Some(explicit) => explicit,
            None => detect(&data)?,
        };
        let size = data.len() as u64;
        Ok(Self::local(
            Source::Buffer(data),
            client_name.map(str::to_string),
            extname,
            mime_type,
            size,
        ))
    }

    /// Rebuild a persisted attachment from its stored representation.
    ///
    /// Accepts a JSON object or a JSON string holding one.
    pub fn from_persisted(value: &Value) -> Result<Self, AttachmentError> {
        let object = match value {
            Value::Object(object) => object.clone(),
            Value::String(raw) => match serde_json::from_str(raw) {
                Ok(Value::Object(object)) => object,
                _ => return Err(AttachmentError::InvalidColumn(raw.clone())),
            },
            other => return Err(AttachmentError::InvalidColumn(other.to_string())),
        };

        let field = |key: &str| object.get(key).filter(|v| !v.is_null());
        if let Some(missing) = REQUIRED_ATTRIBUTES.iter().find(|key| field(key).is_none()) {
            return Err(AttachmentError::missing_attribute(*missing));
        }

        let text = |key: &str| -> Result<String, AttachmentError> {
            field(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| AttachmentError::InvalidColumn(format!("\"{key}\" must be a string")))
        };
        let size = field("size")
            .and_then(Value::as_u64)
            .ok_or_else(|| AttachmentError::InvalidColumn("\"size\" must be an integer".into()))?;

        Ok(Self {
            name: Some(text("name")?),
            reserved_name: None,
            client_name: None,
            extname: text("extname")?,
            mime_type: text("mimeType")?,
            size,
            url: None,
            is_local: false,
            is_persisted: true,
            is_deleted: false,
            options: AttachmentOptions::default(),
            source: None,
        })
    }

    /// Rebuild from a nullable text column.
    pub fn from_column(column: Option<&str>) -> Result<Option<Self>, AttachmentError> {
        let Some(raw) = column else {
            return Ok(None);
        };
        let value: Value =
            serde_json::from_str(raw).map_err(|_| AttachmentError::InvalidColumn(raw.to_string()))?;
        if value.is_null() {
            return Ok(None);
        }
        Self::from_persisted(&value).map(Some)
    }

    /// Storage key once persisted.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        if self.is_persisted { self.name.as_deref() } else { None }
    }

    /// Key this value is or will be stored under.
    #[must_use]
    pub fn storage_key(&self) -> Option<&str> {
        self.name().or(self.reserved_name.as_deref())
    }

    /// Client file name, present until persisted.
    #[must_use]
    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    /// Extension without the leading dot.
    #[must_use]
    pub fn extname(&self) -> &str {
        &self.extname
    }

    /// `type/subtype` MIME type.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Pre-computed URL.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Whether the value carries bytes to write.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.is_local
    }

    /// Whether the bytes are on a disk.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.is_persisted
    }

    /// Whether the stored object has been deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    /// Options in effect.
    #[must_use]
    pub fn options(&self) -> &AttachmentOptions {
        &self.options
    }

    /// Replace the options.
    pub fn set_options(&mut self, options: AttachmentOptions) -> &mut Self {
        self.options = options;
        self
    }

    /// Fill options not set on this value from `defaults`.
    pub fn merge_options(&mut self, defaults: &AttachmentOptions) -> &mut Self {
        self.options = self.options.merged_with(defaults);
        self
    }

    /// Fix the storage key before anything is written.
    ///
    /// Returns `None` for values that are already persisted or have nothing
    /// to write. Repeated calls return the same key.
    pub fn reserve_name(&mut self) -> Option<&str> {
        if self.is_persisted || !self.is_local || self.source.is_none() {
            return None;
        }
        if self.reserved_name.is_none() {
            self.reserved_name = Some(naming::generate(
                self.client_name.as_deref(),
                &self.extname,
                self.options.folder.as_deref(),
            ));
        }
        self.reserved_name.as_deref()
    }

    /// Write the bytes to the configured disk.
    ///
    /// No-op for values that are already persisted or not local.
    pub async fn save(&mut self, drive: &Drive) -> Result<(), AttachmentError> {
        if self.is_persisted || !self.is_local {
            return Ok(());
        }
        let Some(source) = self.source.clone() else {
            return Err(AttachmentError::MissingSource);
        };

        let disk = drive.disk(self.options.disk.as_deref())?;
        let key = match self.reserve_name() {
            Some(key) => key.to_string(),
            None => return Err(AttachmentError::MissingSource),
        };

        match source {
            Source::File(file) => file.move_to_disk(&key, disk.as_ref()).await?,
            Source::Buffer(data) => disk.put(&key, data).await?,
        }

        tracing::debug!(disk = disk.name(), key = %key, size = self.size, "Attachment saved");

        self.name = Some(key);
        self.reserved_name = None;
        self.is_persisted = true;
        self.is_deleted = false;
        self.client_name = None;
        self.source = None;

        self.compute_url(drive).await
    }

    /// Delete the stored object.
    ///
    /// No-op unless persisted. Flags change only after the disk confirms.
    pub async fn delete(&mut self, drive: &Drive) -> Result<(), AttachmentError> {
        let Some(key) = self.name().map(str::to_string) else {
            return Ok(());
        };
        let disk = drive.disk(self.options.disk.as_deref())?;
        disk.delete(&key).await?;

        tracing::debug!(disk = disk.name(), key = %key, "Attachment deleted");

        self.is_deleted = true;
        self.is_persisted = false;
        self.url = None;
        Ok(())
    }

    /// Compute and store the URL when the options ask for it.
    pub async fn compute_url(&mut self, drive: &Drive) -> Result<(), AttachmentError> {
        let Some(key) = self.name().map(str::to_string) else {
            return Ok(());
        };
        let policy = self.options.pre_compute_url().clone();
        if !policy.is_enabled() {
            return Ok(());
        }

        let disk = drive.disk(self.options.disk.as_deref())?;
        let url = match policy {
            PreComputeUrl::Custom(resolver) => resolver.resolve(disk.as_ref(), self).await?,
            PreComputeUrl::Enabled | PreComputeUrl::Disabled => {
                match disk.visibility(&key).await? {
                    Visibility::Private => {
                        disk.signed_url(&key, &SignedUrlOptions::default()).await?
                    }
                    Visibility::Public => disk.url(&key).await?,
                }
            }
        };
        self.url = Some(url);
        Ok(())
    }

    /// Unsigned URL, or an empty string when not persisted.
    pub async fn get_url(&self, drive: &Drive) -> Result<String, AttachmentError> {
        let Some(key) = self.name() else {
            return Ok(String::new());
        };
        let disk = drive.disk(self.options.disk.as_deref())?;
        Ok(disk.url(key).await?)
    }

    /// Signed URL, or an empty string when not persisted.
    pub async fn get_signed_url(
        &self,
        drive: &Drive,
        options: &SignedUrlOptions,
    ) -> Result<String, AttachmentError> {
        let Some(key) = self.name() else {
            return Ok(String::new());
        };
        let disk = drive.disk(self.options.disk.as_deref())?;
        Ok(disk.signed_url(key, options).await?)
    }

    /// Attributes for the database column.
    ///
    /// A reserved but unsaved value reports the reserved key as `name`.
    #[must_use]
    pub fn to_object(&self) -> AttachmentAttributes {
        AttachmentAttributes {
            name: self.storage_key().map(str::to_string),
            extname: self.extname.clone(),
            size: self.size,
            mime_type: self.mime_type.clone(),
        }
    }

    /// Wire representation.
    #[must_use]
    pub fn to_json(&self) -> AttachmentJson {
        AttachmentJson {
            attributes: self.to_object(),
            url: self.url.clone(),
        }
    }

    /// Column text for a database row.
    ///
    /// Fails with [`AttachmentError::MissingSource`] for a value that has no
    /// storage key, such as one that was deleted.
    pub fn to_column(&self) -> Result<String, AttachmentError> {
        if self.storage_key().is_none() {
            return Err(AttachmentError::MissingSource);
        }
        serde_json::to_string(&self.to_object())
            .map_err(|e| AttachmentError::InvalidColumn(e.to_string()))
    }

    /// Whether two values refer to the same stored object.
    #[must_use]
    pub fn same_object(&self, other: &Self) -> bool {
        match (self.name(), other.name()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl Serialize for Attachment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
