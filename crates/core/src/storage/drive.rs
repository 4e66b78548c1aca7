//! Named disk registry.

use std::collections::HashMap;
use std::sync::Arc;

use super::config::DriveConfig;
use super::disk::Disk;
use super::driver::StorageDriver;
use super::error::StorageError;

/// The set of disks attachments can be stored on, plus the default disk name.
#[derive(Clone)]
pub struct Drive {
    default: String,
    disks: HashMap<String, Arc<dyn StorageDriver>>,
}

impl std::fmt::Debug for Drive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.disks.keys().collect();
        names.sort();
        f.debug_struct("Drive")
            .field("default", &self.default)
            .field("disks", &names)
            .finish()
    }
}

impl Drive {
    /// Create an empty drive whose default disk is `default`.
    #[must_use]
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            disks: HashMap::new(),
        }
    }

    /// Build every configured disk.
    ///
    /// # Errors
    ///
    /// Returns an error if a disk cannot be initialized or the default disk
    /// is not configured.
    pub fn from_config(config: &DriveConfig) -> Result<Self, StorageError> {
        let mut drive = Self::new(config.default.clone());
        for (name, disk_config) in &config.disks {
            let disk = Disk::from_config(name.clone(), disk_config.clone(), config.app_key.as_deref())?;
            tracing::debug!(
                disk = %name,
                provider = disk_config.provider.name(),
                visibility = disk_config.visibility.as_str(),
                "Disk configured"
            );
            drive.disks.insert(name.clone(), Arc::new(disk));
        }

        if !drive.disks.contains_key(&drive.default) {
            return Err(StorageError::configuration(format!(
                "default disk \"{}\" is not configured",
                drive.default
            )));
        }
        Ok(drive)
    }

    /// Register a driver under `name`, replacing any existing one.
    #[must_use]
    pub fn with_driver(mut self, name: impl Into<String>, driver: Arc<dyn StorageDriver>) -> Self {
        self.disks.insert(name.into(), driver);
        self
    }

    /// Look up a disk; `None` selects the default disk.
    pub fn disk(&self, name: Option<&str>) -> Result<Arc<dyn StorageDriver>, StorageError> {
        let name = name.unwrap_or(&self.default);
        self.disks
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::UnknownDisk(name.to_string()))
    }

    /// Name of the default disk.
    #[must_use]
    pub fn default_disk_name(&self) -> &str {
        &self.default
    }
}
