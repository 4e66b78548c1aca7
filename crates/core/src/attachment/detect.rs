//! Magic-byte file type detection.

use super::error::AttachmentError;

/// File type of a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferType {
    /// Extension without the leading dot.
    pub extname: String,
    /// `type/subtype` MIME type.
    pub mime_type: String,
}

impl BufferType {
    /// Create an explicit buffer type.
    #[must_use]
    pub fn new(extname: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            extname: extname.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Detect the file type of `bytes` from its leading magic bytes.
pub fn detect(bytes: &[u8]) -> Result<BufferType, AttachmentError> {
    infer::get(bytes)
        .map(|kind| BufferType::new(kind.extension(), kind.mime_type()))
        .ok_or(AttachmentError::UndetectableType)
}
