//! Domain records backed by entities.

use serde::Serialize;
use stowage_core::attachment::{Attachment, AttachmentError, AttachmentOptions};
use stowage_core::lifecycle::{
    AttachmentColumn, AttachmentField, AttachmentRegistry, HasAttachments,
};

use crate::entities::users;

/// Folder cover images are stored under.
pub const COVER_IMAGE_FOLDER: &str = "covers";

/// A user with an avatar and a cover image.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Primary key, `None` until inserted.
    pub id: Option<i32>,
    /// Unique user name.
    pub username: String,
    /// Avatar attachment.
    pub avatar: AttachmentColumn,
    /// Cover image attachment.
    pub cover_image: AttachmentColumn,
}

impl User {
    /// A user that has not been inserted yet.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    /// Set the avatar.
    #[must_use]
    pub fn with_avatar(mut self, avatar: Attachment) -> Self {
        self.avatar.set(avatar);
        self
    }

    /// Set the cover image.
    #[must_use]
    pub fn with_cover_image(mut self, cover_image: Attachment) -> Self {
        self.cover_image.set(cover_image);
        self
    }

    /// Rebuild a user from a row.
    ///
    /// # Errors
    ///
    /// Returns an error if an attachment column holds an invalid value.
    pub fn from_model(model: users::Model) -> Result<Self, AttachmentError> {
        Ok(Self {
            id: Some(model.id),
            username: model.username,
            avatar: AttachmentColumn::loaded(Attachment::from_column(model.avatar.as_deref())?),
            cover_image: AttachmentColumn::loaded(Attachment::from_column(
                model.cover_image.as_deref(),
            )?),
        })
    }
}

impl HasAttachments for User {
    fn attachment_column(&self, field: &str) -> Option<&AttachmentColumn> {
        match field {
            "avatar" => Some(&self.avatar),
            "cover_image" => Some(&self.cover_image),
            _ => None,
        }
    }

    fn attachment_column_mut(&mut self, field: &str) -> Option<&mut AttachmentColumn> {
        match field {
            "avatar" => Some(&mut self.avatar),
            "cover_image" => Some(&mut self.cover_image),
            _ => None,
        }
    }
}

/// Attachment fields of [`User`].
#[must_use]
pub fn user_attachment_fields() -> Vec<AttachmentField> {
    vec![
        AttachmentField::new("avatar", AttachmentOptions::new().with_pre_compute_url(true)),
        AttachmentField::new(
            "cover_image",
            AttachmentOptions::new().with_folder(COVER_IMAGE_FOLDER),
        ),
    ]
}

/// Register every record type of this crate.
pub fn register_records(registry: &mut AttachmentRegistry) {
    registry.register::<User>(user_attachment_fields());
}
