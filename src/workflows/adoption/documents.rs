//! Supporting-document attachments and their intake rules.
//!
//! Files are accepted only while the owning request is editable, must be
//! PDF, ODT, or DOCX, and may not exceed 10 MiB. Batch uploads validate
//! each file independently: valid files are stored, invalid ones are
//! reported per file, never all-or-nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::domain::{DocumentId, RequestId, ValidationIssue};

/// Upload size ceiling per file.
pub const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

/// Accepted file extensions, lowercase.
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["pdf", "odt", "docx"];

/// A stored attachment record; the bytes live behind the
/// [`DocumentBlobStore`] under `storage_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAttachment {
    pub id: DocumentId,
    pub request: RequestId,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: usize,
    pub storage_key: String,
    pub description: String,
    pub uploaded_at: DateTime<Utc>,
}

/// An inbound file before validation.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub description: Option<String>,
}

/// Result of a batch upload: stored and rejected files side by side.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchUploadOutcome {
    pub stored: Vec<DocumentAttachment>,
    pub rejected: Vec<RejectedUpload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedUpload {
    pub file_name: String,
    pub reason: String,
}

/// Blob persistence the workflow delegates to; only keyed put/delete is
/// required of it.
pub trait DocumentBlobStore: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError>;
    fn delete(&self, key: &str) -> Result<(), BlobError>;
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
    #[error("blob {0} not found")]
    Missing(String),
}

pub(crate) fn extension_of(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Check one upload against the type and size rules.
pub(crate) fn validate_upload(upload: &DocumentUpload) -> Result<(), ValidationIssue> {
    match extension_of(&upload.file_name) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => {}
        _ => {
            return Err(ValidationIssue::new(
                upload.file_name.clone(),
                "unsupported format; use PDF, ODT, or DOCX",
            ))
        }
    }

    if upload.bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(ValidationIssue::new(
            upload.file_name.clone(),
            "file too large (maximum 10 MiB)",
        ));
    }

    Ok(())
}

pub(crate) fn content_type_of(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .to_string()
}

/// Fill in per-file descriptions the way the intake form does: an explicit
/// base description is reused (suffixed with the file name when the batch
/// has several files), otherwise a positional fallback is generated.
pub(crate) fn describe(
    base: Option<&str>,
    index: usize,
    file_name: &str,
    batch_size: usize,
) -> String {
    match base.map(str::trim).filter(|base| !base.is_empty()) {
        Some(base) if batch_size > 1 => format!("{base} - {file_name}"),
        Some(base) => base.to_string(),
        None => format!("Document {}: {}", index + 1, file_name),
    }
}
