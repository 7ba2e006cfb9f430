//! Content hashing used for snapshot ids, candidate signatures and the
//! stable record ids that make state-store writes idempotent.

/// Hex blake3 digest over `parts`, separated by a unit separator so that
/// `["ab", "c"]` and `["a", "bc"]` never collide.
pub fn stable_hash(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(&[0x1f]);
        }
        hasher.update(part.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// `prefix-<24 hex chars>` id derived from `parts`.
pub fn stable_id(prefix: &str, parts: &[&str]) -> String {
    let hex = stable_hash(parts);
    format!("{prefix}-{}", &hex[..24])
}

/// Lowercase, trim, and collapse internal whitespace.
pub fn normalize_goal_text(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Round to four decimals so float noise never changes a content hash.
pub fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
