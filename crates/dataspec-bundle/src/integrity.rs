//! Deterministic hashing over canonical JSON
//!
//! Canonical form: object keys sorted, `", "` and `": "` separators,
//! non-ASCII escaped as `\uXXXX`. Hashes of existing bundles and locks stay
//! reproducible byte-for-byte.

use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io;

/// Number of hex characters kept for a bundle integrity hash
pub const BUNDLE_HASH_LEN: usize = 16;

/// Prefix used for content hashes stored in lock files
pub const SHA256_PREFIX: &str = "sha256:";

/// SHA-256 of `data` as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Serialize `value` to its canonical JSON text
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> String {
    let value = sorted(serde_json::to_value(value).unwrap_or(Value::Null));
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, CanonicalFormatter);
    if value.serialize(&mut ser).is_err() {
        return String::new();
    }
    // The formatter only ever writes ASCII.
    String::from_utf8(out).unwrap_or_default()
}

/// Rebuild `value` with every object's keys in sorted order
fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let entries: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sorted(v))).collect();
            Value::Object(entries.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// Integrity hash of a bundle's resolved `(channel, version)` pairs.
///
/// Pairs are sorted before hashing, so the result depends only on the set of
/// pairs and never on declaration order or on any timestamp.
pub fn bundle_integrity_hash<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pairs: Vec<(&str, &str)> = pairs.into_iter().collect();
    pairs.sort();
    let payload = json!({
        "channels": pairs
            .iter()
            .map(|(channel, version)| json!([channel, version]))
            .collect::<Vec<_>>(),
    });
    let digest = sha256_hex(canonical_json(&payload).as_bytes());
    digest[..BUNDLE_HASH_LEN].to_string()
}

/// `sha256:<hex>` of the canonical JSON of `value`
pub fn prefixed_digest<T: Serialize + ?Sized>(value: &T) -> String {
    format!("{}{}", SHA256_PREFIX, sha256_hex(canonical_json(value).as_bytes()))
}

struct CanonicalFormatter;

impl serde_json::ser::Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        for ch in fragment.chars() {
            if ch.is_ascii() && ch != '\x7f' {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn test_canonical_json_layout() {
        let payload = json!({
            "channels": [["b", "2.0.0"], ["a", "1.0.0"]],
            "alpha": {"z": 1, "y": "x"},
        });
        assert_snapshot!(
            canonical_json(&payload),
            @r#"{"alpha": {"y": "x", "z": 1}, "channels": [["b", "2.0.0"], ["a", "1.0.0"]]}"#
        );
    }

    #[test]
    fn test_canonical_json_escapes_non_ascii() {
        let payload = json!({"name": "caf\u{e9}"});
        assert_eq!(canonical_json(&payload), r#"{"name": "caf\u00e9"}"#);
    }

    #[test]
    fn test_bundle_hash_is_order_independent() {
        let forward = bundle_integrity_hash([("imageA", "1.2.0"), ("occupancy", "1.0.0")]);
        let reverse = bundle_integrity_hash([("occupancy", "1.0.0"), ("imageA", "1.2.0")]);
        assert_eq!(forward, reverse);
        assert_eq!(forward.len(), BUNDLE_HASH_LEN);
    }

    #[test]
    fn test_bundle_hash_changes_with_version() {
        let a = bundle_integrity_hash([("imageA", "1.2.0")]);
        let b = bundle_integrity_hash([("imageA", "1.1.0")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_prefixed_digest_has_prefix() {
        let digest = prefixed_digest(&json!({"a": 1}));
        assert!(digest.starts_with(SHA256_PREFIX));
        assert_eq!(digest.len(), SHA256_PREFIX.len() + 64);
    }
}
