//! Attachment encoding: PDF bytes → base64 inline attachment.
//!
//! Multimodal APIs take binary attachments as base64 strings inside the JSON
//! request body. Gemini reads `application/pdf` natively (text layer and page
//! images), so the document is sent whole rather than rasterised page by page.

use crate::pipeline::input::PdfDocument;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

pub const PDF_MIME: &str = "application/pdf";

/// Wrap a validated PDF as an inline attachment for the model request.
pub fn encode_document(doc: &PdfDocument) -> ImageData {
    let b64 = STANDARD.encode(doc.bytes());
    debug!("Encoded {} → {} bytes base64", doc.name(), b64.len());
    ImageData::new(b64, PDF_MIME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_small_document() {
        let doc = PdfDocument::from_bytes("t.pdf", b"%PDF-1.4\n%%EOF".to_vec(), 1024).unwrap();
        let data = encode_document(&doc);
        assert_eq!(data.mime_type, PDF_MIME);
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, b"%PDF-1.4\n%%EOF");
    }
}
