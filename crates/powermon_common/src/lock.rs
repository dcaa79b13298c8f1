//! Exclusive provisioning lock.
//!
//! Serializes entry into the configuring state across concurrent login
//! sessions and the reset tool. The lock is a file created with
//! `O_CREAT|O_EXCL`, so two simultaneous acquisitions race safely: exactly
//! one wins, the other sees contention.
//!
//! Crash recovery: the lock records its holder's pid and acquisition time.
//! A lock whose holder is no longer alive, or that is older than the
//! maximum age, is treated as stale and reclaimed on the next attempt.
//! The guard releases the lock on drop, covering every exit path of the
//! orchestrator.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::error::SetupError;

/// Maximum age before a lock is considered abandoned even if its pid is
/// recycled and appears alive (10 minutes).
const MAX_LOCK_AGE_SECS: u64 = 600;

/// Lock file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process holding the lock.
    pub pid: u32,
    /// Unix epoch seconds when the lock was acquired.
    pub acquired_at: u64,
    /// Hostname, for operators inspecting a contended lock.
    pub hostname: String,
    /// What the holder is doing ("provision" or "reset").
    pub operation: String,
}

impl LockInfo {
    fn new(operation: &str) -> Self {
        let hostname = fs::read_to_string("/etc/hostname")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            pid: process::id(),
            acquired_at: unix_now(),
            hostname,
            operation: operation.to_string(),
        }
    }

    pub fn age_secs(&self) -> u64 {
        unix_now().saturating_sub(self.acquired_at)
    }

    fn is_stale(&self) -> bool {
        self.age_secs() > MAX_LOCK_AGE_SECS
    }

    fn holder_alive(&self) -> bool {
        Path::new(&format!("/proc/{}", self.pid)).exists()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Scoped lock guard. Releases the lock on drop.
#[derive(Debug)]
pub struct ProvisionLock {
    path: PathBuf,
}

impl ProvisionLock {
    /// Attempt to acquire the lock at `path`.
    ///
    /// Stale or dead-holder locks are reclaimed; a lock held by a live
    /// process yields [`SetupError::LockContention`] immediately, never a
    /// wait.
    pub fn acquire(path: &Path, operation: &str) -> Result<Self, SetupError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Two rounds: the second retries once after reclaiming a stale
        // lock. A live holder always returns contention.
        for _ in 0..2 {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(mut file) => {
                    let info = LockInfo::new(operation);
                    let content = serde_json::to_string_pretty(&info)
                        .map_err(|e| SetupError::Io(std::io::Error::other(e)))?;
                    file.write_all(content.as_bytes())?;
                    file.sync_all()?;
                    debug!(pid = info.pid, operation, "provisioning lock acquired");
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    match Self::read_holder(path) {
                        Some(holder) if holder.is_stale() => {
                            warn!(
                                pid = holder.pid,
                                age_secs = holder.age_secs(),
                                "reclaiming stale provisioning lock"
                            );
                            remove_quietly(path)?;
                        }
                        Some(holder) if !holder.holder_alive() => {
                            warn!(pid = holder.pid, "reclaiming lock from dead process");
                            remove_quietly(path)?;
                        }
                        Some(holder) => {
                            return Err(SetupError::LockContention {
                                pid: holder.pid,
                                age_secs: holder.age_secs(),
                            });
                        }
                        // An empty file is a writer that created the lock
                        // but has not finished writing its holder record
                        // yet. Back off as contention; only a non-empty
                        // unparseable file is reclaimed as corrupt.
                        None if file_is_empty(path) => {
                            return Err(SetupError::LockContention {
                                pid: 0,
                                age_secs: 0,
                            });
                        }
                        None => {
                            warn!("removing corrupted provisioning lock");
                            remove_quietly(path)?;
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        // A second writer won the race after our reclaim.
        let holder = Self::read_holder(path);
        Err(SetupError::LockContention {
            pid: holder.as_ref().map(|h| h.pid).unwrap_or_default(),
            age_secs: holder.map(|h| h.age_secs()).unwrap_or_default(),
        })
    }

    /// Whether the lock at `path` is currently held by a live process.
    /// Used for read-only lifecycle-phase derivation; never mutates.
    pub fn is_held(path: &Path) -> bool {
        match Self::read_holder(path) {
            Some(holder) => !holder.is_stale() && holder.holder_alive(),
            None => false,
        }
    }

    /// Whether this process still owns the lock file.
    pub fn is_valid(&self) -> bool {
        Self::read_holder(&self.path)
            .map(|info| info.pid == process::id())
            .unwrap_or(false)
    }

    fn read_holder(path: &Path) -> Option<LockInfo> {
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

impl Drop for ProvisionLock {
    fn drop(&mut self) {
        if self.is_valid() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(error = %e, "failed to release provisioning lock");
            } else {
                debug!("provisioning lock released");
            }
        }
    }
}

fn file_is_empty(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.len() == 0).unwrap_or(true)
}

fn remove_quietly(path: &Path) -> Result<(), SetupError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
