//! Version-token encoding for the network cache.
//!
//! The version identifier is an opaque string token marking a saved
//! revision. The network cache stores it under the identifier key as
//! the sole staleness fence. Cache transports cannot distinguish an
//! empty value from an absent key, so "no identifier yet" is persisted
//! as the `NULL` sentinel and mapped back to `None` on decode.

use uuid::Uuid;

use crate::error::{DocSyncResult, TierError};

/// Sentinel persisted in place of a missing version identifier.
pub const NULL_SENTINEL: &str = "NULL";

/// Mint a fresh version token for a newly committed revision.
pub fn mint_token() -> String {
    Uuid::now_v7().to_string()
}

/// Encode a version token for the identifier key.
///
/// `None` encodes as the sentinel. A document whose real version is the
/// literal sentinel string is indistinguishable from an unversioned
/// one; tokens minted by [`mint_token`] never collide with it.
pub fn encode_token(version: Option<&str>) -> Vec<u8> {
    version.unwrap_or(NULL_SENTINEL).as_bytes().to_vec()
}

/// Decode an identifier-key value back into an optional version token.
///
/// The sentinel decodes to `None`, never the literal string. Non-UTF-8
/// bytes indicate corruption and are a hard decode failure.
pub fn decode_token(bytes: &[u8], key: &str) -> DocSyncResult<Option<String>> {
    let token = std::str::from_utf8(bytes).map_err(|e| TierError::Decode {
        key: key.to_string(),
        reason: format!("identifier is not valid UTF-8: {e}"),
    })?;

    if token == NULL_SENTINEL {
        Ok(None)
    } else {
        Ok(Some(token.to_string()))
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Any token other than the sentinel survives the identifier-key
        /// encoding unchanged.
        #[test]
        fn prop_token_round_trips(token in "[a-zA-Z0-9:-]{1,64}") {
            prop_assume!(token != NULL_SENTINEL);
            let decoded = decode_token(&encode_token(Some(&token)), "k").unwrap();
            prop_assert_eq!(decoded, Some(token));
        }
    }
}
