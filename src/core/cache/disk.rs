//! Cache File Persistence
//!
//! One JSON file per cache entry, named by the first 16 hex characters of
//! the SHA-256 of the cache key. Corrupt files are quarantined with a
//! `.bad` suffix and treated as misses. Writes go through a temp file and
//! rename so a cancelled request never leaves a half-written entry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Hash a cache key into its file stem.
pub fn key_file_stem(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Minimal envelope read back during sweeps.
#[derive(Debug, Deserialize)]
struct SweepEnvelope {
    created_at_epoch_s: u64,
    ttl_s: u64,
}

/// Directory-backed entry store for one cache instance.
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
    /// Files quarantined over this store's lifetime; shared across clones.
    quarantined: Arc<AtomicU64>,
}

impl DiskStore {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            quarantined: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Running count of files quarantined as corrupt.
    pub fn quarantined_count(&self) -> u64 {
        self.quarantined.load(Ordering::Relaxed)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key_file_stem(key)))
    }

    /// Load an entry. Corrupt files are renamed `<name>.bad` and reported
    /// as a miss.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache file unreadable");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache file quarantined");
                self.quarantine(&path);
                None
            }
        }
    }

    /// Persist an entry via temp-file-and-rename.
    pub fn store<T: Serialize>(&self, key: &str, entry: &T) -> io::Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn remove(&self, key: &str) {
        let path = self.path_for(key);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "cache file removal failed");
            }
        }
    }

    /// Delete entries expired at `now_epoch_s`; quarantine unparseable
    /// files. Returns the number of files deleted.
    pub fn sweep(&self, now_epoch_s: u64) -> usize {
        let Ok(read_dir) = fs::read_dir(&self.dir) else {
            return 0;
        };
        let mut removed = 0;
        for dir_entry in read_dir.flatten() {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(contents) = fs::read_to_string(&path) else {
                continue;
            };
            match serde_json::from_str::<SweepEnvelope>(&contents) {
                Ok(envelope) => {
                    if now_epoch_s > envelope.created_at_epoch_s + envelope.ttl_s {
                        if fs::remove_file(&path).is_ok() {
                            removed += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt cache file quarantined");
                    self.quarantine(&path);
                }
            }
        }
        debug!(dir = %self.dir.display(), removed, "cache sweep finished");
        removed
    }

    fn quarantine(&self, path: &Path) {
        let mut bad = path.as_os_str().to_owned();
        bad.push(".bad");
        if let Err(e) = fs::rename(path, PathBuf::from(&bad)) {
            warn!(path = %path.display(), error = %e, "quarantine rename failed");
        }
        self.quarantined.fetch_add(1, Ordering::Relaxed);
    }
}
