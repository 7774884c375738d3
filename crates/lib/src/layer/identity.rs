use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consts::OBJ_HASH_PREFIX_LEN;
use crate::script::Operation;
use crate::util::hash::{ObjectHash, hash_segments};

/// The cache key of a layer. Always usable as a file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
  /// Identity of a base image, derived from its template reference.
  ///
  /// Characters outside `[A-Za-z0-9._-]` become `-`, so `fedora:23` maps to
  /// `fedora-23`. A leading `.` is replaced too. Returns `None` for an empty
  /// reference.
  pub fn base(reference: &str) -> Option<Self> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
      return None;
    }
    let mut normalized: String = trimmed
      .chars()
      .map(|c| if is_name_char(c) { c } else { '-' })
      .collect();
    if normalized.starts_with('.') {
      normalized.replace_range(..1, "-");
    }
    Some(Identity(normalized))
  }

  /// Identity of the layer produced by applying `op` on top of `parent`.
  pub fn derive(parent: &Identity, op: &Operation) -> Self {
    derive_name(parent.as_str(), &op.descriptor())
  }

  /// An explicitly chosen identity. Callers validate with [`is_valid_name`].
  pub fn named(name: &str) -> Self {
    Identity(name.to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Whether this looks like a derived identity rather than a base name.
  pub fn is_digest(&self) -> bool {
    self.0.len() == OBJ_HASH_PREFIX_LEN && self.0.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
  }
}

/// Digest of a parent identity and an operation descriptor.
///
/// Pure: equal inputs always give equal output, which is what lets the cache
/// skip work without looking at disk contents.
pub fn derive_name(parent: &str, descriptor: &str) -> Identity {
  hash_segments(&[parent.as_bytes(), descriptor.as_bytes()]).into()
}

impl From<ObjectHash> for Identity {
  fn from(hash: ObjectHash) -> Self {
    Identity(hash.0)
  }
}

impl fmt::Display for Identity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

fn is_name_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Whether `name` can be used verbatim as a tag or machine name.
pub fn is_valid_name(name: &str) -> bool {
  !name.is_empty() && !name.starts_with('.') && name.chars().all(is_name_char)
}
