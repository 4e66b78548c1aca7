//! Storage configuration types.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Storage provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageProvider {
    /// S3-compatible storage: Cloudflare R2, Supabase, AWS S3, DigitalOcean Spaces
    S3 {
        /// S3 endpoint URL.
        endpoint: String,
        /// S3 bucket name.
        bucket: String,
        /// AWS access key ID.
        access_key_id: String,
        /// AWS secret access key.
        secret_access_key: String,
        /// AWS region.
        region: String,
    },
    /// Azure Blob Storage
    AzureBlob {
        /// Azure storage account name.
        account: String,
        /// Azure storage access key.
        access_key: String,
        /// Azure container name.
        container: String,
    },
    /// Local filesystem
    LocalFs {
        /// Root directory path.
        root: PathBuf,
    },
    /// Process-local memory, lost on restart
    Memory,
}

impl StorageProvider {
    /// Create S3-compatible provider (Cloudflare R2, Supabase, AWS S3).
    #[must_use]
    pub fn s3(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self::S3 {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
        }
    }

    /// Create Azure Blob Storage provider.
    #[must_use]
    pub fn azure_blob(
        account: impl Into<String>,
        access_key: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self::AzureBlob {
            account: account.into(),
            access_key: access_key.into(),
            container: container.into(),
        }
    }

    /// Create local filesystem provider.
    #[must_use]
    pub fn local_fs(root: impl Into<PathBuf>) -> Self {
        Self::LocalFs { root: root.into() }
    }

    /// Get the provider name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::S3 { .. } => "s3",
            Self::AzureBlob { .. } => "azure_blob",
            Self::LocalFs { .. } => "local",
            Self::Memory => "memory",
        }
    }

    /// Whether the provider can presign URLs on its own.
    #[must_use]
    pub fn supports_presign(&self) -> bool {
        matches!(self, Self::S3 { .. } | Self::AzureBlob { .. })
    }
}

/// Default visibility of the objects stored on a disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Served through plain URLs.
    Public,
    /// Served through signed URLs only.
    #[default]
    Private,
}

impl Visibility {
    /// String form used in logs and responses.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// Configuration of a single disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskConfig {
    /// Storage provider configuration.
    pub provider: StorageProvider,
    /// Visibility reported for every object on the disk.
    #[serde(default)]
    pub visibility: Visibility,
    /// Base URL the objects are reachable under (e.g. `/uploads` or a CDN).
    #[serde(default)]
    pub url: Option<String>,
    /// Signed URL TTL in seconds (default: 3600 = 1 hour).
    #[serde(default = "default_signed_url_ttl")]
    pub signed_url_ttl_secs: u64,
    /// Key used to sign URLs when the provider cannot presign.
    /// Falls back to the drive-wide `app_key`.
    #[serde(default)]
    pub signing_key: Option<String>,
}

fn default_signed_url_ttl() -> u64 {
    DiskConfig::DEFAULT_SIGNED_URL_TTL
}

impl DiskConfig {
    /// Default signed URL TTL: 1 hour.
    pub const DEFAULT_SIGNED_URL_TTL: u64 = 3600;

    /// Create a new disk config with default settings.
    #[must_use]
    pub fn new(provider: StorageProvider) -> Self {
        Self {
            provider,
            visibility: Visibility::default(),
            url: None,
            signed_url_ttl_secs: Self::DEFAULT_SIGNED_URL_TTL,
            signing_key: None,
        }
    }

    /// Set the object visibility.
    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Set the public base URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the signed URL TTL.
    #[must_use]
    pub fn with_signed_url_ttl(mut self, secs: u64) -> Self {
        self.signed_url_ttl_secs = secs;
        self
    }

    /// Set the URL signing key.
    #[must_use]
    pub fn with_signing_key(mut self, key: impl Into<String>) -> Self {
        self.signing_key = Some(key.into());
        self
    }
}

/// Configuration of the whole drive: the named disks and which one is default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Name of the disk used when an attachment names none.
    #[serde(default = "default_disk_name")]
    pub default: String,
    /// Application secret, used to sign URLs for disks without their own key.
    #[serde(default)]
    pub app_key: Option<String>,
    /// Disks by name.
    #[serde(default)]
    pub disks: HashMap<String, DiskConfig>,
}

fn default_disk_name() -> String {
    "local".to_string()
}

impl DriveConfig {
    /// Create a drive config with a single default disk.
    #[must_use]
    pub fn single(name: impl Into<String>, disk: DiskConfig) -> Self {
        let name = name.into();
        Self {
            default: name.clone(),
            app_key: None,
            disks: HashMap::from([(name, disk)]),
        }
    }

    /// Add a named disk.
    #[must_use]
    pub fn with_disk(mut self, name: impl Into<String>, disk: DiskConfig) -> Self {
        self.disks.insert(name.into(), disk);
        self
    }

    /// Set the application key.
    #[must_use]
    pub fn with_app_key(mut self, key: impl Into<String>) -> Self {
        self.app_key = Some(key.into());
        self
    }
}
