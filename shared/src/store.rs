//! Per-channel meeting title prefix store.
//!
//! One file per channel under the storage directory. Every operation takes an
//! exclusive lock for its channel with a bounded wait: an in-process async
//! mutex keyed by channel, then an advisory file lock so that several
//! processes sharing the directory also serialize.

use fs2::FileExt;
use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::models::ChannelPrefix;
use crate::{Error, Result};

const FILE_LOCK_POLL: Duration = Duration::from_millis(25);

/// Held for the duration of one store operation.
struct ChannelLock {
    _guard: OwnedMutexGuard<()>,
    _file: File,
}

/// Prefix store keyed by channel id.
pub struct PrefixStore {
    root: PathBuf,
    lock_timeout: Duration,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PrefixStore {
    /// Open the store, creating the storage directory if needed.
    pub fn open(root: impl Into<PathBuf>, lock_timeout: Duration) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            Error::StoreUnavailable(format!("cannot create {}: {}", root.display(), e))
        })?;
        debug!("Prefix store ready at {}", root.display());

        Ok(Self {
            root,
            lock_timeout,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Set the prefix for a channel, or remove it when `text` is empty.
    ///
    /// Returns the stored record, or `None` after a clear.
    pub async fn set_prefix(&self, channel_id: &str, text: &str) -> Result<Option<ChannelPrefix>> {
        let path = self.record_path(channel_id)?;
        let _lock = self.lock(channel_id).await?;

        if text.is_empty() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!("Removed prefix for channel {}", channel_id),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("No prefix to remove for channel {}", channel_id)
                }
                Err(e) => return Err(io_error(&path, e)),
            }
            return Ok(None);
        }

        let staging = path.with_extension("txt.tmp");
        tokio::fs::write(&staging, text)
            .await
            .map_err(|e| io_error(&staging, e))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| io_error(&path, e))?;
        info!("Set prefix for channel {} to '{}'", channel_id, text);

        Ok(Some(ChannelPrefix {
            channel_id: channel_id.to_string(),
            prefix: text.to_string(),
        }))
    }

    /// Read the prefix for a channel. Empty when none is configured.
    pub async fn get_prefix(&self, channel_id: &str) -> Result<String> {
        let path = self.record_path(channel_id)?;
        let _lock = self.lock(channel_id).await?;

        match tokio::fs::read_to_string(&path).await {
            Ok(prefix) => {
                debug!("Loaded prefix '{}' for channel {}", prefix, channel_id);
                Ok(prefix)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    fn record_path(&self, channel_id: &str) -> Result<PathBuf> {
        let valid = !channel_id.is_empty()
            && channel_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(Error::StoreUnavailable(format!(
                "invalid channel identifier '{}'",
                channel_id
            )));
        }
        Ok(self.root.join(format!("{}.txt", channel_id)))
    }

    async fn lock(&self, channel_id: &str) -> Result<ChannelLock> {
        let deadline = Instant::now() + self.lock_timeout;

        let key_lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // An entry nobody else references has no holder and no waiter.
            locks.retain(|key, lock| key == channel_id || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(channel_id.to_string()).or_default())
        };

        let guard = tokio::time::timeout_at(deadline, key_lock.lock_owned())
            .await
            .map_err(|_| timed_out(channel_id, self.lock_timeout))?;

        let lock_path = self.root.join(format!("{}.txt.lock", channel_id));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .await
            .map_err(|e| io_error(&lock_path, e))?
            .into_std()
            .await;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if is_contended(&e) => {
                    if Instant::now() + FILE_LOCK_POLL > deadline {
                        return Err(timed_out(channel_id, self.lock_timeout));
                    }
                    tokio::time::sleep(FILE_LOCK_POLL).await;
                }
                Err(e) => return Err(io_error(&lock_path, e)),
            }
        }

        Ok(ChannelLock {
            _guard: guard,
            _file: file,
        })
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn timed_out(channel_id: &str, bound: Duration) -> Error {
    Error::StoreUnavailable(format!(
        "timed out after {}s waiting for the prefix lock of channel {}",
        bound.as_secs_f32(),
        channel_id
    ))
}

fn io_error(path: &Path, e: std::io::Error) -> Error {
    if e.kind() == ErrorKind::PermissionDenied {
        Error::StoreUnavailable(format!("permission denied for {}", path.display()))
    } else {
        Error::StoreUnavailable(format!("{}: {}", path.display(), e))
    }
}
