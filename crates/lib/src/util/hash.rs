//! Hashing utilities.

use sha2::{Digest, Sha256};

/// Hash a sequence of parts into a `len`-character lowercase hex prefix.
///
/// Parts are separated by a NUL byte so `["ab", "c"]` and `["a", "bc"]` differ.
/// Used for stable generated identifiers such as scoped CSS class names.
pub fn short_hash(parts: &[&str], len: usize) -> String {
  let mut hasher = Sha256::new();
  for part in parts {
    hasher.update(part.as_bytes());
    hasher.update([0u8]);
  }
  let full = hex::encode(hasher.finalize());
  full[..len.min(full.len())].to_string()
}
