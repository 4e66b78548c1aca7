//! User repository for database operations.
//!
//! Every write runs inside an [`AttachmentTransaction`]: attachment keys are
//! reserved before the row write, files are saved after it, and superseded
//! files are deleted only once the transaction commits.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    NotSet, PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr, Unchanged,
};
use stowage_core::{AttachmentError, LifecycleCoordinator};
use stowage_shared::AppError;
use stowage_shared::types::{PageRequest, PageResponse};

use crate::entities::users;
use crate::records::User;
use crate::transaction::AttachmentTransaction;

/// Error types for user repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// User not found.
    #[error("User not found: {0}")]
    NotFound(i32),

    /// The record has never been inserted.
    #[error("User has not been saved yet")]
    NotPersisted,

    /// A before-delete guard vetoed the operation.
    #[error("Operation rejected: {0}")]
    Rejected(String),

    /// Attachment error.
    #[error("Attachment error: {0}")]
    Attachment(#[from] AttachmentError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => Self::NotFound(format!("User {id}")),
            RepositoryError::NotPersisted => Self::Validation(err.to_string()),
            RepositoryError::Rejected(reason) => Self::BusinessRule(reason),
            RepositoryError::Attachment(inner) => inner.into(),
            RepositoryError::Database(inner) => match inner.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    Self::Conflict("Username already taken".to_string())
                }
                _ => Self::Database(inner.to_string()),
            },
        }
    }
}

/// Check run before a user is deleted; an `Err` vetoes the delete.
pub type DeleteGuard = Arc<dyn Fn(&User) -> Result<(), String> + Send + Sync>;

/// User repository for CRUD operations.
#[derive(Clone)]
pub struct UserRepository {
    db: DatabaseConnection,
    coordinator: LifecycleCoordinator,
    delete_guard: Option<DeleteGuard>,
}

impl std::fmt::Debug for UserRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRepository")
            .field("coordinator", &self.coordinator)
            .field("delete_guard", &self.delete_guard.is_some())
            .finish_non_exhaustive()
    }
}

impl UserRepository {
    /// Creates a new user repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection, coordinator: LifecycleCoordinator) -> Self {
        Self {
            db,
            coordinator,
            delete_guard: None,
        }
    }

    /// Install a check that can veto deletes.
    #[must_use]
    pub fn with_delete_guard(
        mut self,
        guard: impl Fn(&User) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.delete_guard = Some(Arc::new(guard));
        self
    }

    /// Begins a transaction for [`save_in`](Self::save_in) and
    /// [`delete_in`](Self::delete_in).
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started.
    pub async fn begin(&self) -> Result<AttachmentTransaction, RepositoryError> {
        Ok(AttachmentTransaction::begin(&self.db, Arc::clone(self.coordinator.drive())).await?)
    }

    /// Inserts or updates a user in its own transaction.
    ///
    /// On failure `user` is restored to its state before the call, so it can
    /// be saved again.
    ///
    /// # Errors
    ///
    /// Returns an error if the row write, an attachment save or the commit
    /// fails. No new file survives a failed save.
    pub async fn save(&self, user: &mut User) -> Result<(), RepositoryError> {
        let snapshot = user.clone();
        let mut tx = self.begin().await?;
        let result = match self.save_in(&mut tx, user).await {
            Ok(()) => tx.commit().await,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!(error = %rollback, "Rollback after failed save failed");
                }
                Err(e)
            }
        };

        if result.is_err() {
            *user = snapshot;
        }
        result
    }

    /// Inserts or updates a user inside `tx`.
    ///
    /// New files are saved immediately and deleted again if `tx` rolls back.
    /// Replaced or cleared files are deleted when `tx` commits.
    ///
    /// After a successful call `user` describes the row as written inside
    /// `tx`. If `tx` then fails to commit or rolls back, `user` no longer
    /// matches the database: discard it or reload it with
    /// [`find_by_id`](Self::find_by_id).
    ///
    /// # Errors
    ///
    /// Returns an error if the row write or an attachment save fails.
    pub async fn save_in(
        &self,
        tx: &mut AttachmentTransaction,
        user: &mut User,
    ) -> Result<(), RepositoryError> {
        let mut plan = self.coordinator.prepare(user)?;

        let model = match Self::write_row(tx.connection(), user).await {
            Ok(model) => model,
            Err(e) => {
                self.coordinator.abort(user, plan).await?;
                return Err(e);
            }
        };

        if let Err(e) = self.coordinator.persist(user, &mut plan).await {
            self.coordinator.abort(user, plan).await?;
            return Err(e.into());
        }

        self.coordinator
            .complete(user, plan, Some(tx.hooks_mut()))
            .await?;
        user.id = Some(model.id);

        tracing::debug!(user_id = model.id, username = %model.username, "User saved");
        Ok(())
    }

    async fn write_row<C: ConnectionTrait>(
        conn: &C,
        user: &User,
    ) -> Result<users::Model, RepositoryError> {
        let now = chrono::Utc::now().into();
        let avatar = user.avatar.to_column_value()?;
        let cover_image = user.cover_image.to_column_value()?;

        match user.id {
            Some(id) => {
                let row = users::ActiveModel {
                    id: Unchanged(id),
                    username: Set(user.username.clone()),
                    avatar: Set(avatar),
                    cover_image: Set(cover_image),
                    created_at: NotSet,
                    updated_at: Set(now),
                };
                row.update(conn).await.map_err(|e| match e {
                    DbErr::RecordNotUpdated => RepositoryError::NotFound(id),
                    other => other.into(),
                })
            }
            None => {
                let row = users::ActiveModel {
                    id: NotSet,
                    username: Set(user.username.clone()),
                    avatar: Set(avatar),
                    cover_image: Set(cover_image),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                Ok(row.insert(conn).await?)
            }
        }
    }

    /// Deletes a user in its own transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the guard vetoes the delete, the user does not
    /// exist, or the delete fails.
    pub async fn delete(&self, user: &User) -> Result<(), RepositoryError> {
        let mut tx = self.begin().await?;
        match self.delete_in(&mut tx, user).await {
            Ok(()) => tx.commit().await,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!(error = %rollback, "Rollback after failed delete failed");
                }
                Err(e)
            }
        }
    }

    /// Deletes a user inside `tx`. Its files are deleted when `tx` commits.
    ///
    /// # Errors
    ///
    /// Returns an error if the guard vetoes the delete, the user does not
    /// exist, or the delete fails.
    pub async fn delete_in(
        &self,
        tx: &mut AttachmentTransaction,
        user: &User,
    ) -> Result<(), RepositoryError> {
        let id = user.id.ok_or(RepositoryError::NotPersisted)?;
        if let Some(guard) = &self.delete_guard {
            guard(user).map_err(RepositoryError::Rejected)?;
        }

        let doomed = self.coordinator.prepare_delete(user)?;
        let result = users::Entity::delete_by_id(id).exec(tx.connection()).await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound(id));
        }

        self.coordinator
            .after_delete(doomed, Some(tx.hooks_mut()))
            .await?;

        tracing::debug!(user_id = id, "User deleted");
        Ok(())
    }

    /// Finds a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, id: i32) -> Result<Option<User>, RepositoryError> {
        let model = users::Entity::find_by_id(id).one(&self.db).await?;
        self.hydrate(model).await
    }

    /// Finds a user by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let model = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.db)
            .await?;
        self.hydrate(model).await
    }

    /// Lists users by ascending ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self, page: &PageRequest) -> Result<PageResponse<User>, RepositoryError> {
        let paginator = users::Entity::find()
            .order_by_asc(users::Column::Id)
            .paginate(&self.db, page.limit());
        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(page.page_index()).await?;

        let mut items = Vec::with_capacity(models.len());
        for model in models {
            let mut user = User::from_model(model)?;
            self.coordinator.hydrate(&mut user).await?;
            items.push(user);
        }

        let per_page = u32::try_from(page.limit()).unwrap_or(PageRequest::MAX_PER_PAGE);
        Ok(PageResponse::new(items, page.page.max(1), per_page, total))
    }

    async fn hydrate(&self, model: Option<users::Model>) -> Result<Option<User>, RepositoryError> {
        let Some(model) = model else {
            return Ok(None);
        };
        let mut user = User::from_model(model)?;
        self.coordinator.hydrate(&mut user).await?;
        Ok(Some(user))
    }
}
