//! Named storage disks using Apache OpenDAL.
//!
//! Supported providers:
//! - S3-compatible: Cloudflare R2, Supabase Storage, AWS S3, DigitalOcean Spaces
//! - Azure Blob Storage
//! - Local filesystem
//! - Memory (tests)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Drive: "local" -> Disk, "r2" -> Disk, ...                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ StorageDriver: put / get / delete / exists / url / signed_url    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Disk (Apache OpenDAL operator + optional HMAC UrlSigner)         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod disk;
mod drive;
mod driver;
mod error;
mod signer;

pub use config::{DiskConfig, DriveConfig, StorageProvider, Visibility};
pub use disk::Disk;
pub use drive::Drive;
pub use driver::{SignedUrlOptions, StorageDriver};
pub use error::StorageError;
#[cfg(test)]
pub(crate) use error::validate_key;
pub use signer::UrlSigner;
