//! Deferred deletes tied to a transaction outcome.

use futures::future::join_all;

use crate::attachment::{Attachment, AttachmentError};
use crate::storage::Drive;

/// Deletes waiting for a transaction to commit or roll back.
///
/// Resolving consumes the hooks, so each queued delete fires at most once.
#[derive(Debug, Default)]
pub struct TransactionHooks {
    commit: Vec<Attachment>,
    rollback: Vec<Attachment>,
}

impl TransactionHooks {
    /// Empty hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete `attachment` once the transaction commits.
    pub fn on_commit(&mut self, attachment: Attachment) {
        self.commit.push(attachment);
    }

    /// Delete `attachment` if the transaction rolls back.
    pub fn on_rollback(&mut self, attachment: Attachment) {
        self.rollback.push(attachment);
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commit.is_empty() && self.rollback.is_empty()
    }

    /// Number of deletes queued for commit.
    #[must_use]
    pub fn pending_commit(&self) -> usize {
        self.commit.len()
    }

    /// Number of deletes queued for rollback.
    #[must_use]
    pub fn pending_rollback(&self) -> usize {
        self.rollback.len()
    }

    /// The transaction committed: delete superseded values.
    ///
    /// Every queued delete is attempted; the first failure is returned.
    pub async fn resolve_commit(self, drive: &Drive) -> Result<(), AttachmentError> {
        delete_all(self.commit, drive, |key, e| {
            AttachmentError::cleanup_failed(key, e)
        })
        .await
    }

    /// The transaction rolled back: delete values saved inside it.
    ///
    /// Every queued delete is attempted; the first failure is returned.
    pub async fn resolve_rollback(self, drive: &Drive) -> Result<(), AttachmentError> {
        delete_all(self.rollback, drive, |key, e| {
            AttachmentError::compensation_failed(key, e)
        })
        .await
    }
}

pub(crate) async fn delete_all(
    attachments: Vec<Attachment>,
    drive: &Drive,
    wrap: fn(String, AttachmentError) -> AttachmentError,
) -> Result<(), AttachmentError> {
    let deletes = attachments.into_iter().map(|mut attachment| async move {
        let key = attachment.name().unwrap_or_default().to_string();
        attachment.delete(drive).await.map_err(|e| (key, e))
    });

    let mut first_error = None;
    for (key, e) in join_all(deletes).await.into_iter().filter_map(Result::err) {
        tracing::warn!(key = %key, error = %e, "Deferred attachment delete failed");
        first_error.get_or_insert(wrap(key, e));
    }
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageDriver;
    use crate::testing::{FlakyDisk, JPEG, memory_drive};

    async fn saved(drive: &Drive) -> Attachment {
        let mut attachment = Attachment::from_buffer(JPEG, None).expect("jpeg");
        attachment.save(drive).await.expect("save");
        attachment
    }

    async fn exists(drive: &Drive, attachment: &Attachment) -> bool {
        drive
            .disk(None)
            .expect("disk")
            .exists(attachment.name().expect("named"))
            .await
            .expect("exists")
    }

    #[tokio::test]
    async fn test_commit_deletes_only_commit_queue() {
        let drive = memory_drive();
        let superseded = saved(&drive).await;
        let fresh = saved(&drive).await;

        let mut hooks = TransactionHooks::new();
        hooks.on_commit(superseded.clone());
        hooks.on_rollback(fresh.clone());
        assert_eq!(hooks.pending_commit(), 1);
        assert_eq!(hooks.pending_rollback(), 1);

        hooks.resolve_commit(&drive).await.expect("commit");
        assert!(!exists(&drive, &superseded).await);
        assert!(exists(&drive, &fresh).await);
    }

    #[tokio::test]
    async fn test_rollback_deletes_only_rollback_queue() {
        let drive = memory_drive();
        let superseded = saved(&drive).await;
        let fresh = saved(&drive).await;

        let mut hooks = TransactionHooks::new();
        hooks.on_commit(superseded.clone());
        hooks.on_rollback(fresh.clone());

        hooks.resolve_rollback(&drive).await.expect("rollback");
        assert!(exists(&drive, &superseded).await);
        assert!(!exists(&drive, &fresh).await);
    }

    #[tokio::test]
    async fn test_failed_compensation_is_reported() {
        let disk = FlakyDisk::new();
        let drive = disk.drive();
        let fresh = saved(&drive).await;

        let mut hooks = TransactionHooks::new();
        hooks.on_rollback(fresh.clone());
        disk.fail_deletes(true);

        let err = hooks.resolve_rollback(&drive).await.unwrap_err();
        assert!(matches!(
            err,
            AttachmentError::CompensationFailed { key, .. } if Some(key.as_str()) == fresh.name()
        ));
    }

    #[test]
    fn test_empty() {
        assert!(TransactionHooks::new().is_empty());
    }
}
