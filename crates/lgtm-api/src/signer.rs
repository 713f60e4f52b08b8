//! Canonical-string request signing for asset-management write operations.
//!
//! The receiving API recomputes the exact same canonical string, so entry
//! ordering and hex rendering here are load-bearing.

use std::collections::BTreeMap;

use lgtm_core::current_unix_timestamp;
use sha1::{Digest, Sha1};

/// Parameter names never included in the canonical signing string.
const SIGNATURE_EXCLUDED_KEYS: [&str; 4] = ["file", "cloud_name", "resource_type", "api_key"];

/// Outbound parameter set carrying the injected `timestamp`, `api_key`, and
/// `signature` entries.
pub type SignedPayload = BTreeMap<String, String>;

#[derive(Clone)]
/// Signs outbound parameter sets with a held key/secret pair.
pub struct RequestSigner {
    api_key: String,
    api_secret: String,
}

impl RequestSigner {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Signs `params` with the current-second timestamp.
    pub fn sign(&self, params: BTreeMap<String, String>) -> SignedPayload {
        self.sign_at(params, current_unix_timestamp())
    }

    /// Signs `params` at an explicit timestamp. Pure function of its inputs
    /// and the held credentials.
    pub fn sign_at(&self, mut params: BTreeMap<String, String>, timestamp_unix: u64) -> SignedPayload {
        params.insert("timestamp".to_string(), timestamp_unix.to_string());
        let signature = hex_digest(&canonical_string(&params), &self.api_secret);
        params.insert("api_key".to_string(), self.api_key.clone());
        params.insert("signature".to_string(), signature);
        params
    }
}

/// Serializes every non-excluded entry as `key=value`, sorts the serialized
/// entries lexicographically, and joins them with `&`.
fn canonical_string(params: &BTreeMap<String, String>) -> String {
    let mut entries = params
        .iter()
        .filter(|(key, _)| !SIGNATURE_EXCLUDED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>();
    entries.sort();
    entries.join("&")
}

/// SHA-1 over canonical string + secret, rendered as lowercase hex with
/// exactly two digits per byte.
fn hex_digest(canonical: &str, secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(canonical.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use sha1::{Digest, Sha1};

    use super::{canonical_string, hex_digest, RequestSigner};

    fn params(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    // Recomputes the signature the way a correctly-implemented receiver
    // would: all non-excluded keys serialized, sorted, joined, secret
    // appended, hashed.
    fn verify(payload: &BTreeMap<String, String>, secret: &str) -> bool {
        let excluded = ["file", "cloud_name", "resource_type", "api_key", "signature"];
        let mut entries = payload
            .iter()
            .filter(|(key, _)| !excluded.contains(&key.as_str()))
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>();
        entries.sort();
        let mut hasher = Sha1::new();
        hasher.update(entries.join("&").as_bytes());
        hasher.update(secret.as_bytes());
        let expected = hex::encode(hasher.finalize());
        payload.get("signature") == Some(&expected)
    }

    #[test]
    fn sign_at_is_deterministic_with_frozen_time() {
        let signer = RequestSigner::new("key", "secret");
        let first = signer.sign_at(params(&[("public_id", "sample")]), 1_600_000_000);
        let second = signer.sign_at(params(&[("public_id", "sample")]), 1_600_000_000);
        assert_eq!(first, second);
        assert_eq!(first.get("timestamp").map(String::as_str), Some("1600000000"));
        assert_eq!(first.get("api_key").map(String::as_str), Some("key"));
    }

    #[test]
    fn excluded_keys_never_reach_the_canonical_string() {
        let canonical = canonical_string(&params(&[
            ("file", "https://example.com/cat.png"),
            ("cloud_name", "demo"),
            ("resource_type", "image"),
            ("api_key", "key"),
            ("colors", "true"),
            ("timestamp", "100"),
        ]));
        assert_eq!(canonical, "colors=true&timestamp=100");
    }

    #[test]
    fn canonical_entries_sort_by_serialized_string() {
        // '-' sorts before '=', so "a-b=2" must precede "a=1" even though
        // the bare keys order the other way.
        let canonical = canonical_string(&params(&[("a", "1"), ("a-b", "2")]));
        assert_eq!(canonical, "a-b=2&a=1");
    }

    #[test]
    fn signature_matches_an_independent_verifier() {
        let signer = RequestSigner::new("key", "secret");
        let payload = signer.sign_at(
            params(&[("file", "https://example.com/cat.png"), ("colors", "true")]),
            1_600_000_000,
        );
        assert!(verify(&payload, "secret"));
        assert!(!verify(&payload, "other-secret"));
    }

    #[test]
    fn signature_is_lowercase_hex_twice_the_digest_length() {
        let signer = RequestSigner::new("key", "secret");
        let payload = signer.sign_at(params(&[]), 1);
        let signature = payload.get("signature").expect("signature");
        assert_eq!(signature.len(), 40);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn digest_bytes_encode_as_exactly_two_lowercase_digits() {
        assert_eq!(hex::encode([0x00_u8]), "00");
        assert_eq!(hex::encode([0x0f_u8]), "0f");
        assert_eq!(hex::encode([0xff_u8]), "ff");
        assert_eq!(hex::encode([0x00_u8, 0xff]), "00ff");
    }

    #[test]
    fn hex_digest_matches_known_sha1_vector() {
        // sha1("abc") = a9993e364706816aba3e25717850c26c9cd0d89d
        assert_eq!(hex_digest("ab", "c"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }
}
