//! SHA256 digests used for fixed-width keys.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA256 of raw bytes.
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("{:x}", Sha256::digest(bytes.as_ref()))
}

/// Digest of a value's JSON form.
///
/// Struct fields serialize in declaration order, so equal values always
/// produce equal digests.
pub fn digest_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_vec(value).map(sha256_hex)
}
