//! Canonical content digests for metadata values.
//!
//! A value is first converted to a `serde_json::Value`, then serialized to
//! JSON bytes and hashed with SHA-256. Object keys are therefore sorted
//! whether they came from struct fields or maps, and sequences keep their
//! element order. A typed payload and the JSON persisted from it hash the same. Two structurally equal
//! values always hash the same; reordering a list changes the hash.

use crate::error::{Error, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Returns the lowercase hex SHA-256 of `value`'s canonical serialization.
///
/// # Example
///
/// ```
/// use imagemeta::digest;
///
/// let a = digest(&vec!["bar", "foo"]).unwrap();
/// let b = digest(&vec!["foo", "bar"]).unwrap();
/// assert_ne!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn digest<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let canonical = serde_json::to_value(value).map_err(Error::Digest)?;
    let bytes = serde_json::to_vec(&canonical).map_err(Error::Digest)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}
