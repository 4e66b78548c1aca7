//! Attachment field registry.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;

use crate::attachment::{AttachmentError, AttachmentOptions};

use super::column::AttachmentColumn;

/// A record type with attachment-valued fields.
pub trait HasAttachments: Any + Send + Sync {
    /// Column for `field`, if the record has it.
    fn attachment_column(&self, field: &str) -> Option<&AttachmentColumn>;

    /// Mutable column for `field`, if the record has it.
    fn attachment_column_mut(&mut self, field: &str) -> Option<&mut AttachmentColumn>;
}

/// A registered attachment field and its options.
#[derive(Debug, Clone)]
pub struct AttachmentField {
    name: String,
    options: AttachmentOptions,
}

impl AttachmentField {
    /// Create a field.
    #[must_use]
    pub fn new(name: impl Into<String>, options: AttachmentOptions) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field options.
    #[must_use]
    pub fn options(&self) -> &AttachmentOptions {
        &self.options
    }
}

#[derive(Debug, Clone)]
struct RecordFields {
    record: &'static str,
    fields: Vec<AttachmentField>,
}

/// Attachment fields of every record type, registered at setup.
#[derive(Debug, Clone, Default)]
pub struct AttachmentRegistry {
    records: HashMap<TypeId, RecordFields>,
}

impl AttachmentRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the attachment fields of `R`, replacing earlier ones.
    pub fn register<R: HasAttachments>(
        &mut self,
        fields: impl IntoIterator<Item = AttachmentField>,
    ) -> &mut Self {
        self.records.insert(
            TypeId::of::<R>(),
            RecordFields {
                record: type_name::<R>(),
                fields: fields.into_iter().collect(),
            },
        );
        self
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with<R: HasAttachments>(
        mut self,
        fields: impl IntoIterator<Item = AttachmentField>,
    ) -> Self {
        self.register::<R>(fields);
        self
    }

    /// Fields registered for `R`.
    pub fn fields<R: HasAttachments>(&self) -> Result<&[AttachmentField], AttachmentError> {
        self.records
            .get(&TypeId::of::<R>())
            .map(|entry| entry.fields.as_slice())
            .ok_or(AttachmentError::UnregisteredRecord(type_name::<R>()))
    }

    /// Type name `R` was registered under.
    pub(crate) fn record_name<R: HasAttachments>(&self) -> &'static str {
        self.records
            .get(&TypeId::of::<R>())
            .map_or_else(type_name::<R>, |entry| entry.record)
    }
}
