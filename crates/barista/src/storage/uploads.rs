//! Attachment files under the upload root.
//!
//! Images land in `images/`, everything else in `documents/`. Each file
//! gets a sanitized name with a random suffix and is created with
//! `create_new`, so an existing file is never overwritten. Callers store
//! the web-relative path (`/uploads/<kind>/<file>`).

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::StorageError;
use crate::sanitize::split_filename;

/// Web prefix under which the upload root is served.
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

/// Attempts at finding an unused random filename before giving up.
const MAX_NAME_ATTEMPTS: usize = 16;

/// Which record collection an upload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    Image,
    Document,
}

impl UploadKind {
    /// Classifies by declared content type: `image/*` is an image,
    /// everything else (including a missing type) is a document.
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.trim().to_ascii_lowercase().starts_with("image/") {
            UploadKind::Image
        } else {
            UploadKind::Document
        }
    }

    /// Subdirectory under the upload root.
    pub fn subdirectory(&self) -> &'static str {
        match self {
            UploadKind::Image => "images",
            UploadKind::Document => "documents",
        }
    }
}

/// Where an upload landed.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Web-relative path stored in the database, e.g. `/uploads/images/x.png`.
    pub relative_path: String,
    /// Filesystem path of the written file.
    pub absolute_path: PathBuf,
    /// Generated filename.
    pub filename: String,
}

/// File store rooted at the configured upload directory.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Writes `content` under `<root>/<kind>/` using a collision-resistant
    /// name derived from `original_name`.
    ///
    /// When `original_name` has no extension, one is guessed from
    /// `content_type`.
    pub fn save(
        &self,
        kind: UploadKind,
        original_name: &str,
        content_type: &str,
        content: &[u8],
    ) -> Result<StoredUpload, StorageError> {
        let dir_path = self.root.join(kind.subdirectory());
        ensure_directory(&dir_path)?;

        let (stem, ext) = split_filename(original_name);
        let ext = ext.or_else(|| extension_for(content_type));

        for _ in 0..MAX_NAME_ATTEMPTS {
            let filename = unique_filename(&stem, ext.as_deref());
            let path = dir_path.join(&filename);

            // create_new gives an atomic check-and-create (O_CREAT | O_EXCL)
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(content).map_err(|e| StorageError::WriteFile {
                        path: path.clone(),
                        source: e,
                    })?;
                    return Ok(StoredUpload {
                        relative_path: format!(
                            "{}/{}/{}",
                            UPLOADS_URL_PREFIX,
                            kind.subdirectory(),
                            filename
                        ),
                        absolute_path: path,
                        filename,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile { path, source: e });
                }
            }
        }

        Err(StorageError::FileExists(dir_path.join(stem)))
    }
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// `<stem>-<8 hex chars>[.<ext>]`
fn unique_filename(stem: &str, ext: Option<&str>) -> String {
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
    match ext {
        Some(ext) => format!("{}-{}.{}", stem, suffix, ext),
        None => format!("{}-{}", stem, suffix),
    }
}

fn extension_for(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    mime_guess::get_mime_extensions_str(essence)
        .and_then(|exts| exts.first())
        .map(|ext| ext.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_classify_content_type() {
        assert_eq!(UploadKind::from_content_type("image/png"), UploadKind::Image);
        assert_eq!(UploadKind::from_content_type("IMAGE/JPEG"), UploadKind::Image);
        assert_eq!(UploadKind::from_content_type("application/pdf"), UploadKind::Document);
        assert_eq!(UploadKind::from_content_type(""), UploadKind::Document);
    }

    #[test]
    fn test_save_image_under_images_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = UploadStore::new(temp_dir.path());

        let stored = store
            .save(UploadKind::Image, "photo.PNG", "image/png", b"\x89PNG")
            .unwrap();

        assert!(stored.absolute_path.starts_with(temp_dir.path().join("images")));
        assert!(stored.relative_path.starts_with("/uploads/images/photo-"));
        assert!(stored.filename.ends_with(".png"));
        assert_eq!(std::fs::read(&stored.absolute_path).unwrap(), b"\x89PNG");
    }

    #[test]
    fn test_save_same_name_twice_yields_distinct_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = UploadStore::new(temp_dir.path());

        let first = store
            .save(UploadKind::Document, "report.pdf", "application/pdf", b"one")
            .unwrap();
        let second = store
            .save(UploadKind::Document, "report.pdf", "application/pdf", b"two")
            .unwrap();

        assert_ne!(first.filename, second.filename);
        assert!(first.relative_path.starts_with("/uploads/documents/report-"));
        assert_eq!(std::fs::read(&second.absolute_path).unwrap(), b"two");
    }

    #[test]
    fn test_save_guesses_missing_extension() {
        let temp_dir = TempDir::new().unwrap();
        let store = UploadStore::new(temp_dir.path());

        let stored = store
            .save(UploadKind::Document, "invoice", "application/pdf", b"%PDF")
            .unwrap();
        assert!(stored.filename.starts_with("invoice-"));
        assert!(stored.filename.ends_with(".pdf"));
    }

    #[test]
    fn test_save_empty_content() {
        let temp_dir = TempDir::new().unwrap();
        let store = UploadStore::new(temp_dir.path());

        let stored = store
            .save(UploadKind::Document, "empty.txt", "text/plain", &[])
            .unwrap();
        assert!(std::fs::read(&stored.absolute_path).unwrap().is_empty());
    }
}
