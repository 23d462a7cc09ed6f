// src/error.rs

use thiserror::Error;

/// Errors that cross the extraction boundary.
///
/// Per-field indeterminacy is never an error: unresolved fields fall back to
/// their documented defaults. A whole strategy failing surfaces as an
/// unusable outcome, not an error. Only a document we cannot read at all is
/// worth propagating, since no fallback can compensate for having no text.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The document could not be opened or parsed at all.
    #[error("unreadable document: {0}")]
    DocumentUnreadable(String),

    /// The config file exists but could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}
