//! Per-identity file locks.
//!
//! Two builds sharing a store may race to create the same layer. Whoever takes
//! the lock first builds it; the other waits, then finds it present and reuses it.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub identity: String,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error(
    "layer {identity} is locked by another process: {command} (PID {pid}, started {started_at})\n\
             If you're sure no strata process is running, remove the lock file:\n  {lock_path}"
  )]
  Contention {
    identity: String,
    command: String,
    pid: u32,
    started_at: String,
    lock_path: PathBuf,
  },

  #[error(
    "layer {identity} is locked (could not read lock metadata)\n\
             If you're sure no strata process is running, remove the lock file:\n  {lock_path}"
  )]
  ContentionUnknown { identity: String, lock_path: PathBuf },

  #[error("Failed to create lock directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("Failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("Failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("Failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// An exclusive lock on one identity. Released when dropped.
#[derive(Debug)]
pub struct LayerLock {
  file: File,
  lock_path: PathBuf,
}

impl LayerLock {
  /// Take the lock at `lock_path`, polling for at most `wait`.
  pub async fn acquire(lock_path: &Path, identity: &str, command: &str, wait: Duration) -> Result<Self, LockError> {
    if let Some(dir) = lock_path.parent() {
      std::fs::create_dir_all(dir).map_err(LockError::CreateDir)?;
    }

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(lock_path)
      .map_err(LockError::OpenFile)?;

    let deadline = Instant::now() + wait;
    let mut announced = false;
    loop {
      match try_lock(&file) {
        Ok(()) => break,
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
          if Instant::now() >= deadline {
            return Err(Self::read_contention_error(lock_path, identity));
          }
          if !announced {
            debug!(identity, lock = %lock_path.display(), "waiting for another build to release layer");
            announced = true;
          }
          tokio::time::sleep(POLL_INTERVAL).await;
        }
        Err(err) => return Err(LockError::LockFailed(err)),
      }
    }

    Self::write_metadata(&file, identity, command)?;

    Ok(LayerLock {
      file,
      lock_path: lock_path.to_path_buf(),
    })
  }

  /// Reads the lock metadata from the held file handle.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  fn write_metadata(file: &File, identity: &str, command: &str) -> Result<(), LockError> {
    let metadata = LockMetadata {
      version: 1,
      pid: std::process::id(),
      started_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
      command: command.to_string(),
      identity: identity.to_string(),
    };

    file.set_len(0).map_err(LockError::WriteMetadata)?;
    let mut writer = io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &metadata).map_err(|e| LockError::WriteMetadata(io::Error::other(e)))?;
    writer.flush().map_err(LockError::WriteMetadata)?;

    Ok(())
  }

  fn read_contention_error(lock_path: &Path, identity: &str) -> LockError {
    if let Ok(mut file) = File::open(lock_path) {
      let mut contents = String::new();
      if file.read_to_string(&mut contents).is_ok()
        && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
      {
        return LockError::Contention {
          identity: identity.to_string(),
          command: metadata.command,
          pid: metadata.pid,
          started_at: format!("Unix timestamp {}", metadata.started_at_unix),
          lock_path: lock_path.to_path_buf(),
        };
      }
    }

    LockError::ContentionUnknown {
      identity: identity.to_string(),
      lock_path: lock_path.to_path_buf(),
    }
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> io::Result<()> {
  Err(io::Error::new(io::ErrorKind::Unsupported, "layer locks require a unix host"))
}
