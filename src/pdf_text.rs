// src/pdf_text.rs

use lopdf::Document;
use tracing::{info, warn};

use crate::error::ExtractError;

/// Pull the text layer out of a PDF: one string, pages concatenated in
/// order. Pages without extractable text contribute nothing. Only a
/// structurally corrupt document is an error.
pub fn extract_document_text(pdf_bytes: &[u8]) -> Result<String, ExtractError> {
    // Structural check first: corrupt documents fail here, image-only
    // documents pass and simply yield little or no text.
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| ExtractError::DocumentUnreadable(format!("failed to parse PDF: {e}")))?;
    let pages = doc.get_pages().len();

    match pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(text) => {
            info!(pages, chars = text.len(), "Extracted document text");
            Ok(text)
        }
        Err(e) => {
            // The document opened but has no usable text layer (often a
            // scan). Hand back empty text; the caller's fallback path will
            // produce a defaulted record.
            warn!(pages, error = %e, "No extractable text layer");
            Ok(String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_unreadable() {
        let result = extract_document_text(b"this is not a pdf");
        assert!(matches!(result, Err(ExtractError::DocumentUnreadable(_))));
    }
}
