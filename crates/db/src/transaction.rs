//! Database transactions that carry attachment hooks.

use std::sync::Arc;

use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};
use stowage_core::{Drive, TransactionHooks};

use crate::repositories::RepositoryError;

/// Runs queued rollback deletes if the transaction is dropped unresolved.
struct HookGuard {
    hooks: Option<TransactionHooks>,
    drive: Arc<Drive>,
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        let Some(hooks) = self.hooks.take().filter(|hooks| !hooks.is_empty()) else {
            return;
        };
        tracing::warn!(
            pending = hooks.pending_rollback(),
            "Transaction dropped without commit or rollback, compensating attachment saves"
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let drive = Arc::clone(&self.drive);
                handle.spawn(async move {
                    if let Err(e) = hooks.resolve_rollback(&drive).await {
                        tracing::error!(error = %e, "Attachment compensation failed");
                    }
                });
            }
            Err(_) => {
                tracing::error!("No async runtime, attachment saves left uncompensated");
            }
        }
    }
}

/// A database transaction plus the attachment deletes that depend on its
/// outcome.
pub struct AttachmentTransaction {
    txn: DatabaseTransaction,
    guard: HookGuard,
}

impl std::fmt::Debug for AttachmentTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentTransaction")
            .field("hooks", &self.guard.hooks)
            .finish_non_exhaustive()
    }
}

impl AttachmentTransaction {
    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started.
    pub async fn begin(db: &DatabaseConnection, drive: Arc<Drive>) -> Result<Self, DbErr> {
        let txn = db.begin().await?;
        Ok(Self {
            txn,
            guard: HookGuard {
                hooks: Some(TransactionHooks::new()),
                drive,
            },
        })
    }

    /// Connection to run queries on.
    #[must_use]
    pub fn connection(&self) -> &DatabaseTransaction {
        &self.txn
    }

    /// Hooks resolved when the transaction ends.
    pub fn hooks_mut(&mut self) -> &mut TransactionHooks {
        self.guard.hooks.get_or_insert_with(TransactionHooks::new)
    }

    /// Commit, then delete the values the transaction superseded.
    ///
    /// If the commit fails, values saved inside the transaction are deleted
    /// instead. A failed delete after a successful commit is logged, since
    /// the write itself stands.
    ///
    /// # Errors
    ///
    /// Returns the commit error, or a compensation error if the commit
    /// failed and its saves could not be deleted.
    pub async fn commit(mut self) -> Result<(), RepositoryError> {
        let hooks = self.guard.hooks.take().unwrap_or_default();
        let drive = Arc::clone(&self.guard.drive);

        match self.txn.commit().await {
            Ok(()) => {
                if let Err(e) = hooks.resolve_commit(&drive).await {
                    tracing::error!(error = %e, "Attachment cleanup after commit failed");
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Commit failed, compensating attachment saves");
                hooks.resolve_rollback(&drive).await?;
                Err(e.into())
            }
        }
    }

    /// Roll back, then delete the values saved inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns the rollback error or a compensation error.
    pub async fn rollback(mut self) -> Result<(), RepositoryError> {
        let hooks = self.guard.hooks.take().unwrap_or_default();
        let drive = Arc::clone(&self.guard.drive);

        let rolled_back = self.txn.rollback().await;
        hooks.resolve_rollback(&drive).await?;
        rolled_back.map_err(RepositoryError::from)
    }
}
