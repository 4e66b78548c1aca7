//! Attachment options and serialized shapes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::storage::StorageDriver;

use super::attachment::Attachment;
use super::error::AttachmentError;

/// Attributes stored in the database column.
///
/// Transient state (client name, URL, source bytes) is never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentAttributes {
    /// Storage key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Extension without the leading dot.
    pub extname: String,
    /// Size in bytes.
    pub size: u64,
    /// `type/subtype` MIME type.
    pub mime_type: String,
}

/// Wire representation: the column attributes plus the URL when computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentJson {
    /// Column attributes.
    #[serde(flatten)]
    pub attributes: AttachmentAttributes,
    /// Pre-computed access URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Computes a URL for a persisted attachment.
#[async_trait]
pub trait UrlResolver: Send + Sync {
    /// Resolve the URL of `attachment` stored on `disk`.
    async fn resolve(
        &self,
        disk: &dyn StorageDriver,
        attachment: &Attachment,
    ) -> Result<String, AttachmentError>;
}

/// Whether and how URLs are computed after save and read.
#[derive(Clone, Default)]
pub enum PreComputeUrl {
    /// URLs are only produced on demand.
    #[default]
    Disabled,
    /// Signed URL on private disks, plain URL on public ones.
    Enabled,
    /// URL produced by a custom resolver.
    Custom(Arc<dyn UrlResolver>),
}

impl std::fmt::Debug for PreComputeUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Enabled => f.write_str("Enabled"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl PreComputeUrl {
    /// Whether any URL is pre-computed.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl From<bool> for PreComputeUrl {
    fn from(enabled: bool) -> Self {
        if enabled { Self::Enabled } else { Self::Disabled }
    }
}

/// Per-field or per-value attachment options.
///
/// Unset fields defer to the options they are merged with.
#[derive(Debug, Clone, Default)]
pub struct AttachmentOptions {
    /// Disk name; `None` selects the default disk.
    pub disk: Option<String>,
    /// Folder prefix of generated keys.
    pub folder: Option<String>,
    /// URL pre-computation policy.
    pub pre_compute_url: Option<PreComputeUrl>,
}

impl AttachmentOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the disk.
    #[must_use]
    pub fn with_disk(mut self, disk: impl Into<String>) -> Self {
        self.disk = Some(disk.into());
        self
    }

    /// Set the folder.
    #[must_use]
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    /// Set the URL pre-computation policy.
    #[must_use]
    pub fn with_pre_compute_url(mut self, policy: impl Into<PreComputeUrl>) -> Self {
        self.pre_compute_url = Some(policy.into());
        self
    }

    /// Fill unset fields from `defaults`.
    #[must_use]
    pub fn merged_with(&self, defaults: &Self) -> Self {
        Self {
            disk: self.disk.clone().or_else(|| defaults.disk.clone()),
            folder: self.folder.clone().or_else(|| defaults.folder.clone()),
            pre_compute_url: self
                .pre_compute_url
                .clone()
                .or_else(|| defaults.pre_compute_url.clone()),
        }
    }

    /// Effective pre-computation policy.
    #[must_use]
    pub fn pre_compute_url(&self) -> &PreComputeUrl {
        static DISABLED: PreComputeUrl = PreComputeUrl::Disabled;
        self.pre_compute_url.as_ref().unwrap_or(&DISABLED)
    }
}
