//! Default JSON document codec.

use docsync_core::{DocSyncResult, Document, TierError};

use crate::tiers::DocumentCodec;

/// Encodes documents as JSON for the network tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDocumentCodec;

impl JsonDocumentCodec {
    pub fn new() -> Self {
        Self
    }
}

impl<D: Document> DocumentCodec<D> for JsonDocumentCodec {
    fn encode(&self, document: &D) -> DocSyncResult<Vec<u8>> {
        serde_json::to_vec(document).map_err(|e| {
            TierError::Encode {
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn decode(&self, bytes: &[u8], key: &str) -> DocSyncResult<D> {
        serde_json::from_slice(bytes).map_err(|e| {
            TierError::Decode {
                key: key.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_core::DocSyncError;
    use docsync_test_utils::{versioned_note, NoteDocument};

    #[test]
    fn test_codec_round_trips_version() {
        let codec = JsonDocumentCodec::new();
        let doc = versioned_note("hello", "v-42");

        let bytes = codec.encode(&doc).unwrap();
        let decoded: NoteDocument = codec.decode(&bytes, "notes:payload").unwrap();

        assert_eq!(decoded, doc);
        assert_eq!(decoded.version, Some("v-42".to_string()));
    }

    #[test]
    fn test_codec_decode_failure_is_hard_error() {
        let codec = JsonDocumentCodec::new();
        let result: DocSyncResult<NoteDocument> = codec.decode(b"{truncated", "notes:payload");

        assert!(matches!(
            result,
            Err(DocSyncError::Tier(TierError::Decode { .. }))
        ));
    }
}
