//! Hashing utilities for layer identities.
//!
//! Layer identities are cache keys, not content hashes of disk bytes: they are
//! derived from the textual description of how a layer was produced.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::OBJ_HASH_PREFIX_LEN;

/// A truncated hash identifying a derived object.
///
/// The hash is a 20-character truncated SHA-256. 80 bits keeps file names
/// readable while accidental collisions stay negligible for the number of
/// layers a single store will ever hold.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string, e.g., `"a1b2c3d4e5f6789012ab"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Hash an ordered list of segments.
///
/// Segments are joined with a NUL byte so that `["ab", "c"]` and `["a", "bc"]`
/// never collide.
pub fn hash_segments(segments: &[&[u8]]) -> ObjectHash {
  let mut hasher = Sha256::new();
  for (idx, segment) in segments.iter().enumerate() {
    if idx > 0 {
      hasher.update([0u8]);
    }
    hasher.update(segment);
  }
  let full = format!("{:x}", hasher.finalize());
  ObjectHash(full[..OBJ_HASH_PREFIX_LEN].to_string())
}
