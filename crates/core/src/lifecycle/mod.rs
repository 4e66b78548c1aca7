//! Attachment lifecycle.
//!
//! Record types expose their attachment fields through [`HasAttachments`]
//! and register them once in an [`AttachmentRegistry`]. The
//! [`LifecycleCoordinator`] then turns each record write or delete into the
//! matching storage saves and deletes, deferring deletes through
//! [`TransactionHooks`] when the write runs inside a transaction.

mod column;
mod coordinator;
mod hooks;
mod registry;

pub use column::{AttachmentColumn, ColumnChange};
pub use coordinator::{LifecycleCoordinator, WritePlan};
pub use hooks::TransactionHooks;
pub use registry::{AttachmentField, AttachmentRegistry, HasAttachments};
