//! Derived identifiers for secret records
//!
//! A record is addressed by `profile/<profile>/<digest>` where `<digest>` is
//! a truncated SHA-256 over the normalized endpoint. Backends that show keys
//! in a UI never see the raw endpoint.

use sha2::{Digest, Sha256};

/// Bytes of the SHA-256 digest kept in a derived key (32 hex chars)
const DIGEST_BYTES: usize = 16;

/// Derive the record key for a `(profile, endpoint)` pair.
///
/// Whitespace around the profile and cosmetic URL differences (case,
/// surrounding whitespace, trailing slashes) map to the same key.
///
/// ```
/// use sabx_core::secrets::derive_key;
///
/// assert_eq!(
///     derive_key("default", "http://nas:8080"),
///     derive_key(" default ", "HTTP://NAS:8080/"),
/// );
/// ```
pub fn derive_key(profile: &str, endpoint: &str) -> String {
    let digest = Sha256::digest(normalize_endpoint(endpoint).as_bytes());
    format!(
        "profile/{}/{}",
        sanitize_profile(profile),
        hex::encode(&digest[..DIGEST_BYTES])
    )
}

/// Human-readable label attached to a record by backends that support one.
pub fn label_for(profile: &str) -> String {
    let name = profile.trim();
    let name = if name.is_empty() { "default" } else { name };
    format!("sabx profile {name} API key")
}

/// Lowercase, trim and strip trailing slashes.
pub fn normalize_endpoint(raw: &str) -> String {
    raw.trim().to_lowercase().trim_end_matches('/').to_string()
}

/// Profile names as they appear inside keys
///
/// Case is kept, since `Home` and `home` are different profiles. Bytes
/// outside `[A-Za-z0-9_-]` are written as `%XX`, which keeps the mapping
/// one-to-one and keeps `/` and `..` out of `pass` paths.
pub fn sanitize_profile(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "default".to_string();
    }
    let mut out = String::with_capacity(trimmed.len());
    for byte in trimmed.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
