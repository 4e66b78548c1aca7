//! Attachment error types.

use thiserror::Error;

use crate::storage::StorageError;

/// Attachment operation errors.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// A required attribute is absent from a persisted representation.
    #[error("Missing attribute \"{0}\"")]
    MissingAttribute(String),

    /// A column value is not valid JSON or not a JSON object.
    #[error("invalid attachment column: {0}")]
    InvalidColumn(String),

    /// `save()` was called on a value that has neither bytes nor a name.
    #[error("attachment has no source to save")]
    MissingSource,

    /// Buffer contents matched no known file type.
    #[error("unable to detect file type from buffer")]
    UndetectableType,

    /// The record type never registered its attachment fields.
    #[error("no attachment fields registered for {0}")]
    UnregisteredRecord(&'static str),

    /// The record does not expose a registered field.
    #[error("{record} has no attachment field \"{field}\"")]
    UnknownField {
        /// Record type name.
        record: &'static str,
        /// Field name.
        field: String,
    },

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Deleting a speculatively saved file failed.
    #[error("failed to compensate save of \"{key}\": {source}")]
    CompensationFailed {
        /// Storage key that could not be removed.
        key: String,
        /// Underlying failure.
        source: Box<AttachmentError>,
    },

    /// Deleting a superseded or orphaned file failed.
    #[error("failed to clean up \"{key}\": {source}")]
    CleanupFailed {
        /// Storage key that could not be removed.
        key: String,
        /// Underlying failure.
        source: Box<AttachmentError>,
    },
}

impl AttachmentError {
    /// Create a missing attribute error.
    #[must_use]
    pub fn missing_attribute(name: impl Into<String>) -> Self {
        Self::MissingAttribute(name.into())
    }

    /// Create an unknown field error.
    #[must_use]
    pub fn unknown_field(record: &'static str, field: impl Into<String>) -> Self {
        Self::UnknownField {
            record,
            field: field.into(),
        }
    }

    /// Wrap a failed compensating delete.
    #[must_use]
    pub fn compensation_failed(key: impl Into<String>, source: Self) -> Self {
        Self::CompensationFailed {
            key: key.into(),
            source: Box::new(source),
        }
    }

    /// Wrap a failed cleanup delete.
    #[must_use]
    pub fn cleanup_failed(key: impl Into<String>, source: Self) -> Self {
        Self::CleanupFailed {
            key: key.into(),
            source: Box::new(source),
        }
    }
}

impl From<AttachmentError> for stowage_shared::AppError {
    fn from(err: AttachmentError) -> Self {
        match err {
            AttachmentError::MissingAttribute(_)
            | AttachmentError::InvalidColumn(_)
            | AttachmentError::UndetectableType => Self::Validation(err.to_string()),
            AttachmentError::Storage(inner) => inner.into(),
            AttachmentError::CompensationFailed { .. } | AttachmentError::CleanupFailed { .. } => {
                Self::Storage(err.to_string())
            }
            AttachmentError::MissingSource
            | AttachmentError::UnregisteredRecord(_)
            | AttachmentError::UnknownField { .. } => Self::Internal(err.to_string()),
        }
    }
}
