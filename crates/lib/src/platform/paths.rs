use crate::consts::APP_NAME;
use std::path::PathBuf;

/// Returns the user's home directory
pub fn home_dir() -> PathBuf {
  std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/"))
}

/// Returns the directory for cache files for the application
pub fn cache_dir() -> PathBuf {
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Returns the layer store root.
///
/// `STRATA_STORE` takes precedence over the cache directory default.
pub fn store_dir() -> PathBuf {
  if let Ok(path) = std::env::var("STRATA_STORE")
    && !path.is_empty()
  {
    return PathBuf::from(path);
  }
  cache_dir().join("store")
}
