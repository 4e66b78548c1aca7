//! Integration tests for attachment columns on the User repository.
//!
//! Runs against in-memory SQLite and the in-memory OpenDAL disk.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait};
use sea_orm_migration::MigratorTrait;
use stowage_core::attachment::{Attachment, AttachmentError, AttachmentOptions, MultipartFile};
use stowage_core::lifecycle::{AttachmentField, AttachmentRegistry, LifecycleCoordinator};
use stowage_core::storage::{
    DiskConfig, Drive, DriveConfig, SignedUrlOptions, StorageDriver, StorageError,
    StorageProvider, Visibility,
};
use stowage_db::entities::users;
use stowage_db::migration::Migrator;
use stowage_db::records::{User, register_records};
use stowage_db::{RepositoryError, UserRepository};
use stowage_shared::AppError;
use stowage_shared::config::DatabaseConfig;
use stowage_shared::types::PageRequest;

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const APP_KEY: &str = "averylong32charsrandomsecretkey";

/// Memory disk whose writes can be made to fail.
struct FlakyDisk {
    inner: Arc<dyn StorageDriver>,
    fail_put: AtomicBool,
    /// 1-based index of the single put that fails, 0 for none.
    fail_nth_put: AtomicUsize,
    puts: AtomicUsize,
}

impl FlakyDisk {
    /// Let the next put succeed and the one after it fail.
    fn fail_second_put_from_now(&self) {
        let done = self.puts.load(Ordering::SeqCst);
        self.fail_nth_put.store(done + 2, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageDriver for FlakyDisk {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        let n = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_put.load(Ordering::SeqCst) || self.fail_nth_put.load(Ordering::SeqCst) == n {
            return Err(StorageError::operation("put failed"));
        }
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.inner.exists(key).await
    }

    async fn url(&self, key: &str) -> Result<String, StorageError> {
        self.inner.url(key).await
    }

    async fn signed_url(
        &self,
        key: &str,
        options: &SignedUrlOptions,
    ) -> Result<String, StorageError> {
        self.inner.signed_url(key, options).await
    }

    async fn visibility(&self, key: &str) -> Result<Visibility, StorageError> {
        self.inner.visibility(key).await
    }
}

struct Harness {
    db: DatabaseConnection,
    drive: Arc<Drive>,
    disk: Arc<FlakyDisk>,
    repo: UserRepository,
}

impl Harness {
    async fn new() -> Self {
        let mut registry = AttachmentRegistry::new();
        register_records(&mut registry);
        Self::with_registry(registry, Visibility::Private).await
    }

    async fn with_registry(registry: AttachmentRegistry, visibility: Visibility) -> Self {
        let db = stowage_db::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
        })
        .await
        .expect("Failed to connect to database");
        Migrator::up(&db, None).await.expect("Failed to migrate");

        let config = DriveConfig::single(
            "local",
            DiskConfig::new(StorageProvider::Memory)
                .with_visibility(visibility)
                .with_url("/uploads"),
        )
        .with_app_key(APP_KEY);
        let memory = Drive::from_config(&config).expect("drive");
        let disk = Arc::new(FlakyDisk {
            inner: memory.disk(None).expect("memory disk"),
            fail_put: AtomicBool::new(false),
            fail_nth_put: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        });
        let drive = Arc::new(
            Drive::new("local").with_driver("local", Arc::clone(&disk) as Arc<dyn StorageDriver>),
        );

        let coordinator = LifecycleCoordinator::new(Arc::clone(&drive), registry);
        let repo = UserRepository::new(db.clone(), coordinator);
        Self {
            db,
            drive,
            disk,
            repo,
        }
    }

    async fn exists(&self, key: &str) -> bool {
        self.drive
            .disk(None)
            .expect("disk")
            .exists(key)
            .await
            .expect("exists")
    }

    async fn row(&self, id: i32) -> Option<users::Model> {
        users::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .expect("query")
    }
}

fn jpeg() -> Attachment {
    Attachment::from_buffer(JPEG, Some("cat.jpeg")).expect("jpeg")
}

fn avatar_key(user: &User) -> String {
    user.avatar
        .get()
        .and_then(Attachment::name)
        .expect("avatar saved")
        .to_string()
}

/// Saves a user with an avatar and returns the avatar key.
async fn saved_user(harness: &Harness, username: &str) -> (User, String) {
    let mut user = User::new(username).with_avatar(jpeg());
    harness.repo.save(&mut user).await.expect("save user");
    let key = avatar_key(&user);
    (user, key)
}

// ============================================================================
// Insert
// ============================================================================

#[tokio::test]
async fn test_insert_saves_attachment() {
    let harness = Harness::new().await;
    let (user, key) = saved_user(&harness, "virk").await;

    assert!(key.starts_with("cat-"));
    assert!(key.ends_with(".jpg"));
    assert!(harness.exists(&key).await);

    let row = harness.row(user.id.expect("id")).await.expect("row");
    let column: serde_json::Value =
        serde_json::from_str(row.avatar.as_deref().expect("avatar column")).expect("json");
    assert_eq!(column["name"], key.as_str());
    assert_eq!(column["size"], JPEG.len());
    assert_eq!(column["extname"], "jpg");
    assert_eq!(column["mimeType"], "image/jpeg");
    assert!(column.get("url").is_none());
    assert!(row.cover_image.is_none());
}

#[tokio::test]
async fn test_insert_uses_field_folder() {
    let harness = Harness::new().await;
    let mut user = User::new("virk").with_cover_image(jpeg());
    harness.repo.save(&mut user).await.expect("save");

    let key = user.cover_image.get().and_then(Attachment::name).expect("saved");
    assert!(key.starts_with("covers/cat-"));
    assert!(harness.exists(key).await);
}

#[tokio::test]
async fn test_insert_uses_runtime_folder() {
    let harness = Harness::new().await;
    let mut cover = jpeg();
    cover.set_options(AttachmentOptions::new().with_folder("a/b/c"));
    let mut user = User::new("virk").with_cover_image(cover);
    harness.repo.save(&mut user).await.expect("save");

    let key = user.cover_image.get().and_then(Attachment::name).expect("saved");
    assert!(key.starts_with("a/b/c/cat-"));
    assert!(harness.exists(key).await);
}

#[tokio::test]
async fn test_insert_from_uploaded_file() {
    let harness = Harness::new().await;
    let file = MultipartFile::new(
        "avatar",
        Some("Profile Picture.png".to_string()),
        Some("image/png".to_string()),
        Bytes::from_static(PNG),
    );
    let mut user = User::new("virk").with_avatar(Attachment::from_file(file));
    harness.repo.save(&mut user).await.expect("save");

    let key = avatar_key(&user);
    assert!(key.starts_with("Profile Picture-"));
    assert!(key.ends_with(".png"));
    assert_eq!(
        harness.drive.disk(None).expect("disk").get(&key).await.expect("bytes"),
        Bytes::from_static(PNG)
    );
}

#[tokio::test]
async fn test_failed_insert_leaves_no_file() {
    let harness = Harness::new().await;
    saved_user(&harness, "virk").await;

    let mut avatar = jpeg();
    let reserved = avatar.reserve_name().expect("reserved key").to_string();
    let mut duplicate = User::new("virk").with_avatar(avatar);
    let err = harness.repo.save(&mut duplicate).await.unwrap_err();
    assert_eq!(AppError::from(err).status_code(), 409);

    assert!(!harness.exists(&reserved).await);
    assert!(duplicate.id.is_none());
}

#[tokio::test]
async fn test_failed_save_leaves_no_row() {
    let harness = Harness::new().await;
    harness.disk.fail_put.store(true, Ordering::SeqCst);

    let mut user = User::new("virk").with_avatar(jpeg());
    let err = harness.repo.save(&mut user).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Attachment(_)));
    assert!(harness.repo.find_by_username("virk").await.expect("query").is_none());
}

#[tokio::test]
async fn test_insert_rolled_back_deletes_file() {
    let harness = Harness::new().await;
    let mut user = User::new("virk").with_avatar(jpeg());

    let mut tx = harness.repo.begin().await.expect("begin");
    harness.repo.save_in(&mut tx, &mut user).await.expect("save");
    let key = avatar_key(&user);
    assert!(harness.exists(&key).await);

    tx.rollback().await.expect("rollback");
    assert!(!harness.exists(&key).await);
    assert!(harness.repo.find_by_username("virk").await.expect("query").is_none());
}

#[tokio::test]
async fn test_insert_committed_keeps_file() {
    let harness = Harness::new().await;
    let mut user = User::new("virk").with_avatar(jpeg());

    let mut tx = harness.repo.begin().await.expect("begin");
    harness.repo.save_in(&mut tx, &mut user).await.expect("save");
    tx.commit().await.expect("commit");

    assert!(harness.exists(&avatar_key(&user)).await);
}

#[tokio::test]
async fn test_dropped_transaction_compensates() {
    let harness = Harness::new().await;
    let mut user = User::new("virk").with_avatar(jpeg());

    let mut tx = harness.repo.begin().await.expect("begin");
    harness.repo.save_in(&mut tx, &mut user).await.expect("save");
    let key = avatar_key(&user);
    drop(tx);

    let mut deleted = false;
    for _ in 0..50 {
        if !harness.exists(&key).await {
            deleted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(deleted, "dropped transaction should delete its saved file");
}

#[tokio::test]
async fn test_failed_save_restores_user_for_retry() {
    let harness = Harness::new().await;
    harness.disk.fail_put.store(true, Ordering::SeqCst);

    let mut user = User::new("virk").with_avatar(jpeg()).with_cover_image(jpeg());
    assert!(harness.repo.save(&mut user).await.is_err());
    assert!(user.id.is_none());
    let avatar = user.avatar.get().expect("avatar kept");
    assert!(avatar.is_local());
    assert!(!avatar.is_persisted());

    harness.disk.fail_put.store(false, Ordering::SeqCst);
    harness.repo.save(&mut user).await.expect("retry");

    let found = harness
        .repo
        .find_by_id(user.id.expect("id"))
        .await
        .expect("row readable")
        .expect("user");
    assert_eq!(avatar_key(&found), avatar_key(&user));
    assert!(harness.exists(&avatar_key(&user)).await);
}

#[tokio::test]
async fn test_retry_after_second_attachment_fails() {
    let harness = Harness::new().await;
    let mut avatar = jpeg();
    let avatar_reserved = avatar.reserve_name().expect("reserved").to_string();
    let mut user = User::new("virk").with_avatar(avatar).with_cover_image(jpeg());

    harness.disk.fail_second_put_from_now();
    assert!(harness.repo.save(&mut user).await.is_err());
    assert!(!harness.exists(&avatar_reserved).await);
    assert!(harness.repo.find_by_username("virk").await.expect("query").is_none());

    harness.repo.save(&mut user).await.expect("retry");
    let found = harness
        .repo
        .find_by_username("virk")
        .await
        .expect("row readable")
        .expect("user");
    for key in [
        avatar_key(&found),
        found
            .cover_image
            .get()
            .and_then(Attachment::name)
            .expect("cover saved")
            .to_string(),
    ] {
        assert!(harness.exists(&key).await);
    }
}

#[tokio::test]
async fn test_saving_deleted_attachment_fails() {
    let harness = Harness::new().await;
    let (owner, _) = saved_user(&harness, "virk").await;
    let mut avatar = owner.avatar.get().expect("avatar").clone();
    avatar.delete(&harness.drive).await.expect("delete");

    let mut user = User::new("romain").with_avatar(avatar);
    let err = harness.repo.save(&mut user).await.unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::Attachment(AttachmentError::MissingSource)
    ));
    assert!(harness.repo.find_by_username("romain").await.expect("query").is_none());
}

#[tokio::test]
async fn test_commit_failure_deletes_new_file() {
    let harness = Harness::new().await;
    for sql in [
        "CREATE TABLE parents (id INTEGER PRIMARY KEY)",
        "CREATE TABLE children (
             parent_id INTEGER REFERENCES parents (id) DEFERRABLE INITIALLY DEFERRED
         )",
    ] {
        harness.db.execute_unprepared(sql).await.expect("create table");
    }

    let mut user = User::new("virk").with_avatar(jpeg());
    let mut tx = harness.repo.begin().await.expect("begin");
    harness.repo.save_in(&mut tx, &mut user).await.expect("save");
    let key = avatar_key(&user);
    tx.connection()
        .execute_unprepared("INSERT INTO children (parent_id) VALUES (999)")
        .await
        .expect("deferred violation");
    assert!(harness.exists(&key).await);

    let err = tx.commit().await.unwrap_err();
    assert!(matches!(err, RepositoryError::Database(_)));
    assert!(!harness.exists(&key).await);
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn test_update_replaces_file() {
    let harness = Harness::new().await;
    let (mut user, old_key) = saved_user(&harness, "virk").await;

    user.avatar.set(jpeg());
    harness.repo.save(&mut user).await.expect("update");
    let new_key = avatar_key(&user);

    assert_ne!(old_key, new_key);
    assert!(!harness.exists(&old_key).await);
    assert!(harness.exists(&new_key).await);
}

#[tokio::test]
async fn test_update_loaded_user_replaces_file() {
    let harness = Harness::new().await;
    let (user, old_key) = saved_user(&harness, "virk").await;

    let mut loaded = harness
        .repo
        .find_by_id(user.id.expect("id"))
        .await
        .expect("query")
        .expect("user");
    loaded.avatar.set(jpeg());
    harness.repo.save(&mut loaded).await.expect("update");

    assert!(!harness.exists(&old_key).await);
    assert!(harness.exists(&avatar_key(&loaded)).await);
}

#[tokio::test]
async fn test_update_rolled_back_keeps_old_file() {
    let harness = Harness::new().await;
    let (mut user, old_key) = saved_user(&harness, "virk").await;

    user.avatar.set(jpeg());
    let mut tx = harness.repo.begin().await.expect("begin");
    harness.repo.save_in(&mut tx, &mut user).await.expect("update");
    let new_key = avatar_key(&user);
    tx.rollback().await.expect("rollback");

    assert!(harness.exists(&old_key).await);
    assert!(!harness.exists(&new_key).await);

    let row = harness.row(user.id.expect("id")).await.expect("row");
    assert!(row.avatar.expect("avatar").contains(&old_key));
}

#[tokio::test]
async fn test_failed_update_keeps_old_file() {
    let harness = Harness::new().await;
    let (mut user, old_key) = saved_user(&harness, "virk").await;

    harness.disk.fail_put.store(true, Ordering::SeqCst);
    user.avatar.set(jpeg());
    assert!(harness.repo.save(&mut user).await.is_err());

    assert!(harness.exists(&old_key).await);
    let row = harness.row(user.id.expect("id")).await.expect("row");
    assert!(row.avatar.expect("avatar").contains(&old_key));
}

#[tokio::test]
async fn test_update_without_attachment_change_keeps_file() {
    let harness = Harness::new().await;
    let (mut user, key) = saved_user(&harness, "virk").await;

    user.username = "romain".to_string();
    harness.repo.save(&mut user).await.expect("update");

    assert!(harness.exists(&key).await);
    assert_eq!(avatar_key(&user), key);
}

#[tokio::test]
async fn test_reset_to_null_deletes_file() {
    let harness = Harness::new().await;
    let (mut user, key) = saved_user(&harness, "virk").await;

    user.avatar.clear();
    harness.repo.save(&mut user).await.expect("update");

    assert!(!harness.exists(&key).await);
    let row = harness.row(user.id.expect("id")).await.expect("row");
    assert!(row.avatar.is_none());
}

#[tokio::test]
async fn test_reset_to_null_rolled_back_keeps_file() {
    let harness = Harness::new().await;
    let (mut user, key) = saved_user(&harness, "virk").await;

    user.avatar.clear();
    let mut tx = harness.repo.begin().await.expect("begin");
    harness.repo.save_in(&mut tx, &mut user).await.expect("update");
    tx.rollback().await.expect("rollback");

    assert!(harness.exists(&key).await);
}

#[tokio::test]
async fn test_update_missing_user() {
    let harness = Harness::new().await;
    let mut user = User::new("ghost");
    user.id = Some(404);
    assert!(matches!(
        harness.repo.save(&mut user).await,
        Err(RepositoryError::NotFound(404))
    ));
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_removes_file() {
    let harness = Harness::new().await;
    let (user, key) = saved_user(&harness, "virk").await;

    harness.repo.delete(&user).await.expect("delete");
    assert!(!harness.exists(&key).await);
    assert!(harness.row(user.id.expect("id")).await.is_none());
}

#[tokio::test]
async fn test_delete_rolled_back_keeps_file() {
    let harness = Harness::new().await;
    let (user, key) = saved_user(&harness, "virk").await;

    let mut tx = harness.repo.begin().await.expect("begin");
    harness.repo.delete_in(&mut tx, &user).await.expect("delete");
    tx.rollback().await.expect("rollback");

    assert!(harness.exists(&key).await);
    assert!(harness.row(user.id.expect("id")).await.is_some());
}

#[tokio::test]
async fn test_delete_guard_keeps_file() {
    let harness = Harness::new().await;
    let (user, key) = saved_user(&harness, "virk").await;
    let repo = harness
        .repo
        .clone()
        .with_delete_guard(|user| Err(format!("{} is protected", user.username)));

    let err = repo.delete(&user).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Rejected(reason) if reason == "virk is protected"));
    assert!(harness.exists(&key).await);
    assert!(harness.row(user.id.expect("id")).await.is_some());
}

#[tokio::test]
async fn test_delete_unsaved_user() {
    let harness = Harness::new().await;
    assert!(matches!(
        harness.repo.delete(&User::new("virk")).await,
        Err(RepositoryError::NotPersisted)
    ));
}

// ============================================================================
// Find / list
// ============================================================================

fn pre_computing_registry() -> AttachmentRegistry {
    AttachmentRegistry::new().with::<User>([
        AttachmentField::new("avatar", AttachmentOptions::new().with_pre_compute_url(true)),
        AttachmentField::new("cover_image", AttachmentOptions::new()),
    ])
}

#[tokio::test]
async fn test_find_pre_computes_signed_url() {
    let harness = Harness::with_registry(pre_computing_registry(), Visibility::Private).await;
    let (user, key) = saved_user(&harness, "virk").await;
    assert!(user.avatar.get().and_then(Attachment::url).is_some());

    let found = harness
        .repo
        .find_by_id(user.id.expect("id"))
        .await
        .expect("query")
        .expect("user");
    let url = found.avatar.get().and_then(Attachment::url).expect("url");
    assert!(url.starts_with(&format!("/uploads/{key}?expires=")));
    assert!(url.contains("&signature="));
}

#[tokio::test]
async fn test_find_pre_computes_public_url() {
    let harness = Harness::with_registry(pre_computing_registry(), Visibility::Public).await;
    let (_, key) = saved_user(&harness, "virk").await;

    let found = harness
        .repo
        .find_by_username("virk")
        .await
        .expect("query")
        .expect("user");
    assert_eq!(
        found.avatar.get().and_then(Attachment::url),
        Some(format!("/uploads/{key}").as_str())
    );
}

#[tokio::test]
async fn test_find_without_pre_compute_has_no_url() {
    let harness = Harness::new().await;
    let mut user = User::new("virk").with_cover_image(jpeg());
    harness.repo.save(&mut user).await.expect("save");

    let found = harness
        .repo
        .find_by_id(user.id.expect("id"))
        .await
        .expect("query")
        .expect("user");
    assert!(found.cover_image.get().is_some_and(|a| a.url().is_none()));

    let json = serde_json::to_value(&found).expect("serialize");
    assert!(json["coverImage"].get("url").is_none());
    assert_eq!(json["coverImage"]["extname"], "jpg");
    assert!(json["avatar"].is_null());
}

#[tokio::test]
async fn test_list_pre_computes_urls() {
    let harness = Harness::with_registry(pre_computing_registry(), Visibility::Public).await;
    saved_user(&harness, "virk").await;
    saved_user(&harness, "romain").await;
    let mut plain = User::new("nikk");
    harness.repo.save(&mut plain).await.expect("save");

    let page = harness
        .repo
        .list(&PageRequest {
            page: 1,
            per_page: 2,
        })
        .await
        .expect("list");

    assert_eq!(page.meta.total, 3);
    assert_eq!(page.meta.total_pages, 2);
    assert_eq!(page.data.len(), 2);
    assert!(
        page.data
            .iter()
            .all(|user| user.avatar.get().and_then(Attachment::url).is_some())
    );

    let second = harness
        .repo
        .list(&PageRequest {
            page: 2,
            per_page: 2,
        })
        .await
        .expect("list");
    assert_eq!(second.data.len(), 1);
    assert_eq!(second.data[0].username, "nikk");
    assert!(second.data[0].avatar.get().is_none());
}
