//! Opaque continuation tokens.
//!
//! A token is URL-safe base64 over a compact JSON object `{"i": index, "f": {..}}`.
//! Decoding never fails: anything that is not a token produced by [`encode`]
//! decodes to index 0 with no filters, which callers treat exactly like "no cursor".

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Decoded form of a continuation token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    pub index: usize,
    pub filters: BTreeMap<String, String>,
    /// False when the input was absent or unparseable.
    pub valid: bool,
}

#[derive(Serialize, Deserialize)]
struct Wire {
    i: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    f: BTreeMap<String, String>,
}

pub fn encode(index: usize) -> String {
    encode_with_filters(index, &BTreeMap::new())
}

pub fn encode_with_filters(index: usize, filters: &BTreeMap<String, String>) -> String {
    let wire = Wire { i: index, f: filters.clone() };
    // Serializing a usize and a string map cannot fail.
    let json = serde_json::to_vec(&wire).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

pub fn decode(token: Option<&str>) -> Cursor {
    let Some(raw) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        return Cursor::default();
    };
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(raw) else {
        return Cursor::default();
    };
    match serde_json::from_slice::<Wire>(&bytes) {
        Ok(wire) => Cursor { index: wire.i, filters: wire.f, valid: true },
        Err(_) => Cursor::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_index_and_filters() {
        let mut filters = BTreeMap::new();
        filters.insert("k".to_string(), "v".to_string());
        filters.insert("state".to_string(), "all".to_string());
        let token = encode_with_filters(5, &filters);
        let cursor = decode(Some(&token));
        assert!(cursor.valid);
        assert_eq!(cursor.index, 5);
        assert_eq!(cursor.filters, filters);
    }

    #[test]
    fn round_trip_over_index_range() {
        for index in [0usize, 1, 2, 99, 100, 4096, usize::MAX] {
            let cursor = decode(Some(&encode(index)));
            assert_eq!(cursor.index, index);
            assert!(cursor.filters.is_empty());
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let mut filters = BTreeMap::new();
        filters.insert("b".to_string(), "2".to_string());
        filters.insert("a".to_string(), "1".to_string());
        assert_eq!(encode_with_filters(7, &filters), encode_with_filters(7, &filters.clone()));
    }

    #[test]
    fn malformed_input_resets_to_zero() {
        let bad = [
            "not-base64!!",
            "bad",
            "e30",     // "{}" has no index
            "W10",     // "[]"
            "eyJpIjotMX0", // {"i":-1}
            "////",
            "\u{1F600}",
        ];
        for input in bad {
            let cursor = decode(Some(input));
            assert_eq!(cursor.index, 0, "input {input:?}");
            assert!(cursor.filters.is_empty(), "input {input:?}");
            assert!(!cursor.valid, "input {input:?}");
        }
    }

    #[test]
    fn absent_and_empty_tokens_are_fresh_starts() {
        assert_eq!(decode(None), Cursor::default());
        assert_eq!(decode(Some("")), Cursor::default());
        assert_eq!(decode(Some("   ")), Cursor::default());
    }

    #[test]
    fn index_beyond_any_collection_still_decodes() {
        assert_eq!(decode(Some(&encode(10))).index, 10);
    }
}
