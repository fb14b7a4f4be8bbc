//! Temporal data fingerprint
//!
//! A deterministic SHA-256 digest over a node's canonical temporal, spatial
//! and content fields. Used for deduplication and change detection.
//!
//! Each value is lower-cased and trimmed, then the map is serialized as
//! compact JSON with sorted keys before hashing.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::node::Node;

/// Fingerprint for a node
pub fn compute_tdf_hash(node: &Node) -> String {
    let mut payload: BTreeMap<&str, String> = BTreeMap::new();
    payload.insert("year", node.year.to_string());
    payload.insert("month", node.month.clone());
    payload.insert("day", node.day.to_string());
    payload.insert("time", node.time.clone());
    payload.insert("country", node.country.clone());
    payload.insert("region", node.region.clone());
    payload.insert("city", node.city.clone());
    payload.insert("slug", node.slug.clone());
    payload.insert("name", node.name.clone());
    payload.insert("one_liner", node.description.clone());

    hash_payload(&payload)
}

fn hash_payload(payload: &BTreeMap<&str, String>) -> String {
    let normalized: BTreeMap<&str, String> = payload
        .iter()
        .map(|(k, v)| (*k, v.trim().to_lowercase()))
        .collect();

    // BTreeMap keys serialize in sorted order; to_string emits no whitespace
    let canonical = serde_json::to_string(&normalized).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// True when the stored fingerprint is missing or no longer matches
pub fn is_stale(node: &Node) -> bool {
    node.tdf_hash.is_empty() || node.tdf_hash != compute_tdf_hash(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn sample() -> Node {
        Node::builder()
            .date(1969, 7, 20)
            .time("2056")
            .location("united-states", "florida", "cape-canaveral")
            .name("Apollo 11 Moon Landing")
            .description("First crewed landing on the Moon")
            .build()
            .unwrap()
            .into_node(chrono::Utc::now())
            .unwrap()
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = compute_tdf_hash(&sample());
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_ignores_case_and_whitespace() {
        let a = sample();
        let mut b = sample();
        b.name = "  APOLLO 11 moon landing ".into();
        assert_eq!(compute_tdf_hash(&a), compute_tdf_hash(&b));
    }

    #[test]
    fn test_hash_tracks_content() {
        let a = sample();
        let mut b = sample();
        b.description = "Eagle has landed".into();
        assert_ne!(compute_tdf_hash(&a), compute_tdf_hash(&b));
    }

    #[test]
    fn test_hash_ignores_non_canonical_fields() {
        let a = sample();
        let mut b = sample();
        b.tags.insert("space".into());
        b.era = "cold-war".into();
        assert_eq!(compute_tdf_hash(&a), compute_tdf_hash(&b));
    }

    #[test]
    fn test_known_payload() {
        let mut payload = BTreeMap::new();
        payload.insert("a", " X ".to_string());
        // sha256 of {"a":"x"}
        let expected = {
            let mut h = Sha256::new();
            h.update(br#"{"a":"x"}"#);
            format!("{:x}", h.finalize())
        };
        assert_eq!(hash_payload(&payload), expected);
    }

    #[test]
    fn test_is_stale() {
        let mut node = sample();
        assert!(!is_stale(&node));
        node.tdf_hash.clear();
        assert!(is_stale(&node));
    }
}
