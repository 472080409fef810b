//! File storage for ingested attachments.

pub mod uploads;

pub use uploads::{StoredUpload, UploadKind, UploadStore, UPLOADS_URL_PREFIX};
