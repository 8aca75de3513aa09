//! Canonicalization and fingerprint helpers for key generation.

use std::collections::BTreeMap;

use md5::{Digest, Md5};
use rand::Rng;
use serde_json::Value;

/// Maximum length of a canonicalized key component.
const MAX_COMPONENT_LEN: usize = 50;

const BASE36_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Canonicalize one key component: lowercase, ASCII alphanumerics only,
/// truncated to 50 characters. An empty result becomes `unknown`.
pub fn clean_component(raw: &str) -> String {
    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_COMPONENT_LEN)
        .collect();

    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// 8-hex-character fingerprint over the identifying fields.
///
/// The fields serialize as key-sorted JSON so the digest is independent of
/// construction order. MD5 here is a fast, well-distributed fingerprint,
/// not a security primitive.
pub fn fingerprint(fields: &BTreeMap<&str, Value>) -> String {
    let canonical = serde_json::to_string(fields).unwrap_or_default();
    let digest = Md5::digest(canonical.as_bytes());
    hex::encode(digest)[..8].to_string()
}

/// Random lowercase base36 string of the given length.
pub fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36_CHARS[rng.gen_range(0..BASE36_CHARS.len())] as char)
        .collect()
}

/// Random hex string of the given length.
pub fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..len.div_ceil(2)).map(|_| rng.gen()).collect();
    let mut encoded = hex::encode(bytes);
    encoded.truncate(len);
    encoded
}

/// Basic `local@domain` shape check.
pub fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && domain.contains('.')
        }
        None => false,
    }
}
