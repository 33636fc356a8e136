//! docsync test utilities
//!
//! Centralized test infrastructure for the docsync workspace: a
//! concrete document type and option fixtures shared by unit and
//! integration tests.

use serde::{Deserialize, Serialize};

// Re-export core types for convenience
pub use docsync_core::{
    decode_token, encode_token, mint_token, CacheExpiry, Document, DocSyncError, DocSyncResult,
    DocumentCacheOptions, OperationScope, SharedDocument, StoreError, TierError, NULL_SENTINEL,
};

/// A small versioned document for tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDocument {
    pub title: String,
    pub body: String,
    pub version: Option<String>,
}

impl NoteDocument {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            version: None,
        }
    }
}

impl Document for NoteDocument {
    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn set_version(&mut self, version: Option<String>) {
        self.version = version;
    }
}

/// A note with the given body and no version.
pub fn note(body: &str) -> NoteDocument {
    NoteDocument::new("note", body)
}

/// A note carrying an already-assigned version token.
pub fn versioned_note(body: &str, version: &str) -> NoteDocument {
    let mut doc = note(body);
    doc.version = Some(version.to_string());
    doc
}

/// Cache options with the standard test keys and no expiration.
pub fn note_options() -> DocumentCacheOptions {
    DocumentCacheOptions::new("notes:payload", "notes:identifier")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_document_version_contract() {
        let mut doc = note("body");
        assert_eq!(doc.version(), None);

        doc.set_version(Some("v1".to_string()));
        assert_eq!(doc.version(), Some("v1"));

        doc.set_version(None);
        assert_eq!(doc.version(), None);
    }

    #[test]
    fn test_note_options_keys() {
        let options = note_options();
        assert_eq!(options.payload_key, "notes:payload");
        assert_eq!(options.identifier_key, "notes:identifier");
    }
}
