//! The lifecycle coordinator.
//!
//! A record write runs in four steps:
//!
//! 1. [`prepare`](LifecycleCoordinator::prepare) before the row write: diff
//!    every registered field and reserve keys for new local values, so the
//!    row can reference them.
//! 2. The caller writes the row.
//! 3. [`persist`](LifecycleCoordinator::persist) after the row write: save
//!    the new values. A failed save deletes whatever this write already saved.
//! 4. [`complete`](LifecycleCoordinator::complete): inside a transaction,
//!    queue superseded values for deletion on commit and new values for
//!    deletion on rollback; outside one, delete superseded values now.
//!
//! When the row write (or anything after `persist`) fails, the caller hands
//! the plan to [`abort`](LifecycleCoordinator::abort) instead of `complete`.

use std::sync::Arc;

use crate::attachment::{Attachment, AttachmentError};
use crate::storage::Drive;

use super::column::{AttachmentColumn, ColumnChange};
use super::hooks::{TransactionHooks, delete_all};
use super::registry::{AttachmentRegistry, HasAttachments};

#[derive(Debug)]
struct PlannedChange {
    field: String,
    superseded: Option<Attachment>,
    persist: bool,
}

/// Attachment work pending for one record write.
#[derive(Debug, Default)]
#[must_use = "a write plan must be completed or aborted"]
pub struct WritePlan {
    changes: Vec<PlannedChange>,
    /// Saved fields with their value as it was before the save.
    saved: Vec<(String, Attachment)>,
}

impl WritePlan {
    /// Whether the write touches no attachment.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Fields whose new value has to be saved.
    pub fn fields_to_persist(&self) -> impl Iterator<Item = &str> {
        self.changes
            .iter()
            .filter(|c| c.persist)
            .map(|c| c.field.as_str())
    }

    /// Values that will be deleted once the write is complete.
    pub fn superseded(&self) -> impl Iterator<Item = &Attachment> {
        self.changes.iter().filter_map(|c| c.superseded.as_ref())
    }
}

/// Binds attachment saves and deletes to record writes.
#[derive(Debug, Clone)]
pub struct LifecycleCoordinator {
    drive: Arc<Drive>,
    registry: Arc<AttachmentRegistry>,
}

impl LifecycleCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(drive: Arc<Drive>, registry: AttachmentRegistry) -> Self {
        Self {
            drive,
            registry: Arc::new(registry),
        }
    }

    /// Drive attachments are stored on.
    #[must_use]
    pub fn drive(&self) -> &Arc<Drive> {
        &self.drive
    }

    /// Registered fields.
    #[must_use]
    pub fn registry(&self) -> &AttachmentRegistry {
        &self.registry
    }

    fn column<'r, R: HasAttachments>(
        &self,
        record: &'r R,
        field: &str,
    ) -> Result<&'r AttachmentColumn, AttachmentError> {
        record
            .attachment_column(field)
            .ok_or_else(|| AttachmentError::unknown_field(self.registry.record_name::<R>(), field))
    }

    fn column_mut<'r, R: HasAttachments>(
        &self,
        record: &'r mut R,
        field: &str,
    ) -> Result<&'r mut AttachmentColumn, AttachmentError> {
        record
            .attachment_column_mut(field)
            .ok_or_else(|| AttachmentError::unknown_field(self.registry.record_name::<R>(), field))
    }

    /// Diff the record's fields and reserve keys for new values.
    ///
    /// Call before the row write.
    pub fn prepare<R: HasAttachments>(&self, record: &mut R) -> Result<WritePlan, AttachmentError> {
        let record_name = self.registry.record_name::<R>();
        let mut plan = WritePlan::default();

        for field in self.registry.fields::<R>()? {
            let column = self.column_mut(record, field.name())?;
            column.apply_options(field.options());

            let superseded = match column.change() {
                ColumnChange::Unchanged => continue,
                ColumnChange::Set => None,
                ColumnChange::Replaced { old } | ColumnChange::Cleared { old } => Some(old),
            };
            let persist = match column.get_mut() {
                Some(value) if !value.is_persisted() => {
                    if value.reserve_name().is_none() {
                        tracing::warn!(
                            record = record_name,
                            field = field.name(),
                            "Attachment has nothing to write"
                        );
                        return Err(AttachmentError::MissingSource);
                    }
                    true
                }
                _ => false,
            };

            tracing::debug!(
                record = record_name,
                field = field.name(),
                persist,
                supersedes = superseded.as_ref().and_then(Attachment::name),
                "Attachment change planned"
            );

            plan.changes.push(PlannedChange {
                field: field.name().to_string(),
                superseded,
                persist,
            });
        }

        Ok(plan)
    }

    /// Save the new values of a planned write.
    ///
    /// Call after the row write succeeded. If a save fails, values this plan
    /// already saved are deleted and superseded values are left alone.
    pub async fn persist<R: HasAttachments>(
        &self,
        record: &mut R,
        plan: &mut WritePlan,
    ) -> Result<(), AttachmentError> {
        for change in plan.changes.iter().filter(|c| c.persist) {
            let column = self.column_mut(record, &change.field)?;
            let Some(value) = column.get_mut() else {
                continue;
            };

            let before = value.clone();
            let result = value.save(&self.drive).await;
            if value.is_persisted() && !plan.saved.iter().any(|(field, _)| *field == change.field) {
                plan.saved.push((change.field.clone(), before));
            }

            if let Err(e) = result {
                tracing::warn!(field = %change.field, error = %e, "Attachment save failed");
                self.compensate(record, &mut plan.saved).await?;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Undo a write that failed after [`prepare`](Self::prepare).
    ///
    /// Deletes every value the plan saved. Superseded values are untouched.
    pub async fn abort<R: HasAttachments>(
        &self,
        record: &mut R,
        mut plan: WritePlan,
    ) -> Result<(), AttachmentError> {
        self.compensate(record, &mut plan.saved).await
    }

    /// Delete saved values and put back the unsaved value, so the record can
    /// be written again. A value whose delete failed stays persisted.
    async fn compensate<R: HasAttachments>(
        &self,
        record: &mut R,
        saved: &mut Vec<(String, Attachment)>,
    ) -> Result<(), AttachmentError> {
        let mut first_error = None;
        for (field, before) in std::mem::take(saved) {
            let column = self.column_mut(record, &field)?;
            let Some(value) = column.get_mut() else {
                continue;
            };
            let key = value.name().unwrap_or_default().to_string();
            match value.delete(&self.drive).await {
                Ok(()) => {
                    tracing::warn!(field = %field, key = %key, "Compensated attachment save");
                    column.replace(Some(before));
                }
                Err(e) => {
                    tracing::error!(field = %field, key = %key, error = %e, "Attachment compensation failed");
                    first_error.get_or_insert(AttachmentError::compensation_failed(key, e));
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Finish a write whose row and saves succeeded.
    ///
    /// With `hooks`, superseded values are deleted on commit and new values
    /// on rollback. Without, superseded values are deleted now.
    pub async fn complete<R: HasAttachments>(
        &self,
        record: &mut R,
        plan: WritePlan,
        hooks: Option<&mut TransactionHooks>,
    ) -> Result<(), AttachmentError> {
        let WritePlan { changes, saved } = plan;
        let superseded: Vec<Attachment> = changes.into_iter().filter_map(|c| c.superseded).collect();

        let result = match hooks {
            Some(hooks) => {
                for (field, _) in &saved {
                    if let Some(value) = self.column(record, field)?.get() {
                        hooks.on_rollback(value.clone());
                    }
                }
                for old in superseded {
                    hooks.on_commit(old);
                }
                Ok(())
            }
            None => {
                delete_all(superseded, &self.drive, |key, e| {
                    AttachmentError::cleanup_failed(key, e)
                })
                .await
            }
        };

        for field in self.registry.fields::<R>()? {
            self.column_mut(record, field.name())?.sync();
        }
        result
    }

    /// Collect the stored values of a record about to be deleted.
    ///
    /// Call before the row delete.
    pub fn prepare_delete<R: HasAttachments>(
        &self,
        record: &R,
    ) -> Result<Vec<Attachment>, AttachmentError> {
        let mut doomed = Vec::new();
        for field in self.registry.fields::<R>()? {
            let column = self.column(record, field.name())?;
            let stored = column
                .original()
                .or_else(|| column.get())
                .filter(|value| value.is_persisted());
            if let Some(value) = stored {
                let mut value = value.clone();
                value.merge_options(field.options());
                doomed.push(value);
            }
        }
        Ok(doomed)
    }

    /// Delete the values of a deleted record.
    ///
    /// With `hooks`, deletion waits for the commit.
    pub async fn after_delete(
        &self,
        attachments: Vec<Attachment>,
        hooks: Option<&mut TransactionHooks>,
    ) -> Result<(), AttachmentError> {
        match hooks {
            Some(hooks) => {
                for attachment in attachments {
                    hooks.on_commit(attachment);
                }
                Ok(())
            }
            None => {
                delete_all(attachments, &self.drive, |key, e| {
                    AttachmentError::cleanup_failed(key, e)
                })
                .await
            }
        }
    }

    /// Apply field options to a record read from the database and compute
    /// URLs where enabled.
    pub async fn hydrate<R: HasAttachments>(&self, record: &mut R) -> Result<(), AttachmentError> {
        for field in self.registry.fields::<R>()? {
            let column = self.column_mut(record, field.name())?;
            column.apply_options(field.options());
            if let Some(value) = column.get_mut() {
                value.compute_url(&self.drive).await?;
            }
        }
        Ok(())
    }
}
