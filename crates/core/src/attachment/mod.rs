//! Attachment values.
//!
//! An [`Attachment`] describes one file bound to a record field: its
//! metadata, lifecycle flags and the options used to store it. It is built
//! from an upload, a raw buffer, or a persisted column value.

#[allow(clippy::module_inception)]
mod attachment;
mod detect;
mod error;
pub mod naming;
mod types;
mod upload;

pub use attachment::Attachment;
pub use detect::{BufferType, detect};
pub use error::AttachmentError;
pub use types::{
    AttachmentAttributes, AttachmentJson, AttachmentOptions, PreComputeUrl, UrlResolver,
};
pub use upload::{MultipartFile, OCTET_STREAM, UploadedFile};
