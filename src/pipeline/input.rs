//! Input loading: read a timetable PDF into memory and validate it.
//!
//! The whole document travels to the model inline, so it has to fit in one
//! request. We check the `%PDF` magic bytes and the size limit before any
//! network call so callers get a meaningful error instead of a quota-burning
//! rejection from the API.

use crate::error::Tt2CalError;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

/// A validated PDF held in memory.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    name: String,
    bytes: Vec<u8>,
    digest: String,
}

impl PdfDocument {
    /// Validate `bytes` against the PDF magic and `max_bytes`.
    pub fn from_bytes(
        name: impl Into<String>,
        bytes: Vec<u8>,
        max_bytes: usize,
    ) -> Result<Self, Tt2CalError> {
        if bytes.len() > max_bytes {
            return Err(Tt2CalError::DocumentTooLarge {
                size: bytes.len(),
                limit: max_bytes,
            });
        }
        if !bytes.starts_with(b"%PDF") {
            return Err(Tt2CalError::NotAPdf {
                magic: bytes.iter().take(4).copied().collect(),
            });
        }
        let digest = hex::encode(Sha256::digest(&bytes));
        Ok(Self {
            name: name.into(),
            bytes,
            digest,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hex SHA-256 of the content. Renaming a file does not change it.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// Read and validate a local PDF.
pub async fn load_document(path: &Path, max_bytes: usize) -> Result<PdfDocument, Tt2CalError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Tt2CalError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => Tt2CalError::Internal(format!("Failed to read '{}': {e}", path.display())),
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "timetable.pdf".to_string());

    let doc = PdfDocument::from_bytes(name, bytes, max_bytes)?;
    debug!(
        "Loaded {} ({} bytes, sha256 {})",
        path.display(),
        doc.bytes().len(),
        &doc.digest()[..12]
    );
    Ok(doc)
}
