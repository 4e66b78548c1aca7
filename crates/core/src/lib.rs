//! Core attachment logic for Stowage.
//!
//! This crate has ZERO web or database dependencies. It binds stored files to
//! record fields and keeps the two consistent across writes, deletes and
//! transaction outcomes.
//!
//! # Modules
//!
//! - `storage` - Named disks over Apache OpenDAL, URL signing
//! - `attachment` - The attachment value: metadata, flags, save/delete/url
//! - `lifecycle` - Field registry, change tracking and the lifecycle coordinator

pub mod attachment;
pub mod lifecycle;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use attachment::{Attachment, AttachmentError, AttachmentOptions};
pub use lifecycle::{AttachmentRegistry, HasAttachments, LifecycleCoordinator, TransactionHooks};
pub use storage::{Drive, StorageDriver, StorageError};
