//! OpenDAL-backed disk.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use opendal::{ErrorKind, Operator, services};

use super::config::{DiskConfig, StorageProvider, Visibility};
use super::driver::{SignedUrlOptions, StorageDriver};
use super::error::{StorageError, validate_key};
use super::signer::UrlSigner;

/// A named disk backed by an OpenDAL operator.
///
/// S3 and Azure disks presign URLs themselves. Filesystem and memory disks
/// sign URLs locally with the disk's (or the application's) signing key.
pub struct Disk {
    name: String,
    operator: Operator,
    config: DiskConfig,
    signer: Option<UrlSigner>,
}

impl std::fmt::Debug for Disk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disk")
            .field("name", &self.name)
            .field("provider", &self.config.provider.name())
            .field("visibility", &self.config.visibility)
            .finish_non_exhaustive()
    }
}

fn configuration(err: opendal::Error) -> StorageError {
    StorageError::configuration(err.to_string())
}

impl Disk {
    /// Create a disk from configuration.
    ///
    /// `app_key` signs URLs when the disk has no `signing_key` of its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be initialized.
    pub fn from_config(
        name: impl Into<String>,
        config: DiskConfig,
        app_key: Option<&str>,
    ) -> Result<Self, StorageError> {
        let operator = Self::create_operator(&config.provider)?;
        let signer = config
            .signing_key
            .as_deref()
            .or(app_key)
            .map(UrlSigner::new)
            .transpose()?;

        Ok(Self {
            name: name.into(),
            operator,
            config,
            signer,
        })
    }

    /// Create OpenDAL operator from provider config.
    fn create_operator(provider: &StorageProvider) -> Result<Operator, StorageError> {
        let operator = match provider {
            StorageProvider::S3 {
                endpoint,
                bucket,
                access_key_id,
                secret_access_key,
                region,
            } => {
                let builder = services::S3::default()
                    .endpoint(endpoint)
                    .bucket(bucket)
                    .access_key_id(access_key_id)
                    .secret_access_key(secret_access_key)
                    .region(region);
                Operator::new(builder).map_err(configuration)?.finish()
            }
            StorageProvider::AzureBlob {
                account,
                access_key,
                container,
            } => {
                let builder = services::Azblob::default()
                    .account_name(account)
                    .account_key(access_key)
                    .container(container);
                Operator::new(builder).map_err(configuration)?.finish()
            }
            StorageProvider::LocalFs { root } => {
                let builder = services::Fs::default().root(
                    root.to_str()
                        .ok_or_else(|| StorageError::configuration("invalid path"))?,
                );
                Operator::new(builder).map_err(configuration)?.finish()
            }
            StorageProvider::Memory => Operator::new(services::Memory::default())
                .map_err(configuration)?
                .finish(),
        };

        Ok(operator)
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &DiskConfig {
        &self.config
    }

    fn base_url(&self) -> String {
        if let Some(url) = &self.config.url {
            return url.trim_end_matches('/').to_string();
        }
        match &self.config.provider {
            StorageProvider::S3 {
                endpoint, bucket, ..
            } => format!("{}/{bucket}", endpoint.trim_end_matches('/')),
            StorageProvider::AzureBlob {
                account, container, ..
            } => format!("https://{account}.blob.core.windows.net/{container}"),
            StorageProvider::LocalFs { .. } | StorageProvider::Memory => String::new(),
        }
    }

    fn ttl(&self, options: &SignedUrlOptions) -> Duration {
        options
            .expires_in
            .unwrap_or_else(|| Duration::from_secs(self.config.signed_url_ttl_secs))
    }

    async fn presign(
        &self,
        key: &str,
        ttl: Duration,
        options: &SignedUrlOptions,
    ) -> Result<String, opendal::Error> {
        let mut request = self.operator.presign_read_with(key, ttl);
        if let Some(content_type) = options.content_type.as_deref() {
            request = request.override_content_type(content_type);
        }
        if let Some(disposition) = options.content_disposition.as_deref() {
            request = request.override_content_disposition(disposition);
        }
        let presigned = request.await?;
        Ok(presigned.uri().to_string())
    }

    fn sign_locally(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            StorageError::configuration(format!(
                "disk \"{}\" cannot sign URLs without a signing key",
                self.name
            ))
        })?;
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp().saturating_add(ttl);
        Ok(signer.signed_url(&format!("{}/{key}", self.base_url()), key, expires_at))
    }
}

#[async_trait]
impl StorageDriver for Disk {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        validate_key(key)?;
        self.operator
            .write(key, data)
            .await
            .map(|_| ())
            .map_err(StorageError::from)
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        validate_key(key)?;
        match self.operator.read(key).await {
            Ok(buffer) => Ok(buffer.to_bytes()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        match self.operator.delete(key).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        validate_key(key)?;
        match self.operator.stat(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn url(&self, key: &str) -> Result<String, StorageError> {
        validate_key(key)?;
        Ok(format!("{}/{key}", self.base_url()))
    }

    async fn signed_url(
        &self,
        key: &str,
        options: &SignedUrlOptions,
    ) -> Result<String, StorageError> {
        validate_key(key)?;
        let ttl = self.ttl(options);

        if self.config.provider.supports_presign() {
            match self.presign(key, ttl, options).await {
                Ok(url) => return Ok(url),
                Err(e) if e.kind() == ErrorKind::Unsupported => {
                    tracing::debug!(disk = %self.name, "presign unsupported, signing locally");
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.sign_locally(key, ttl)
    }

    async fn visibility(&self, key: &str) -> Result<Visibility, StorageError> {
        validate_key(key)?;
        Ok(self.config.visibility)
    }

    fn signer(&self) -> Option<&UrlSigner> {
        self.signer.as_ref()
    }
}
