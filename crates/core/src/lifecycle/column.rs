//! Per-field change tracking.

use serde::{Serialize, Serializer};

use crate::attachment::{Attachment, AttachmentError, AttachmentOptions};

/// What happened to an attachment field since it was last written.
#[derive(Debug, Clone)]
pub enum ColumnChange {
    /// Nothing to do.
    Unchanged,
    /// A value was assigned to an empty field.
    Set,
    /// A stored value was replaced by another one.
    Replaced {
        /// The value being replaced.
        old: Attachment,
    },
    /// A stored value was removed.
    Cleared {
        /// The value being removed.
        old: Attachment,
    },
}

/// An attachment-valued record field.
///
/// Keeps the value as last read from or written to the database next to the
/// current in-memory value, so a write can tell what changed.
#[derive(Debug, Clone, Default)]
pub struct AttachmentColumn {
    original: Option<Attachment>,
    current: Option<Attachment>,
}

impl AttachmentColumn {
    /// Column of a record that has not been written yet.
    #[must_use]
    pub fn new(value: Option<Attachment>) -> Self {
        Self {
            original: None,
            current: value,
        }
    }

    /// Column of a record read from the database.
    #[must_use]
    pub fn loaded(value: Option<Attachment>) -> Self {
        Self {
            original: value.clone(),
            current: value,
        }
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> Option<&Attachment> {
        self.current.as_ref()
    }

    /// Current value, mutably.
    pub fn get_mut(&mut self) -> Option<&mut Attachment> {
        self.current.as_mut()
    }

    /// Value as last written.
    #[must_use]
    pub fn original(&self) -> Option<&Attachment> {
        self.original.as_ref()
    }

    /// Assign a value.
    pub fn set(&mut self, value: Attachment) {
        self.current = Some(value);
    }

    /// Remove the value.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Assign or remove, returning the previous current value.
    pub fn replace(&mut self, value: Option<Attachment>) -> Option<Attachment> {
        std::mem::replace(&mut self.current, value)
    }

    /// Diff the current value against the original.
    ///
    /// Two values are the same only if both are stored under the same key;
    /// a local value always counts as a change.
    #[must_use]
    pub fn change(&self) -> ColumnChange {
        let old = self.original.as_ref().filter(|a| a.is_persisted());
        match (old, self.current.as_ref()) {
            (None, None) => ColumnChange::Unchanged,
            (None, Some(_)) => ColumnChange::Set,
            (Some(old), None) => ColumnChange::Cleared { old: old.clone() },
            (Some(old), Some(new)) if old.same_object(new) => ColumnChange::Unchanged,
            (Some(old), Some(_)) => ColumnChange::Replaced { old: old.clone() },
        }
    }

    /// Whether the next write has to touch this field.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !matches!(self.change(), ColumnChange::Unchanged)
    }

    /// Merge field options into both values.
    pub fn apply_options(&mut self, options: &AttachmentOptions) {
        for value in [self.original.as_mut(), self.current.as_mut()]
            .into_iter()
            .flatten()
        {
            value.merge_options(options);
        }
    }

    /// Mark the current value as written.
    pub fn sync(&mut self) {
        self.original.clone_from(&self.current);
    }

    /// Text to store in the database column.
    pub fn to_column_value(&self) -> Result<Option<String>, AttachmentError> {
        self.current.as_ref().map(Attachment::to_column).transpose()
    }
}

impl Serialize for AttachmentColumn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.current.serialize(serializer)
    }
}
