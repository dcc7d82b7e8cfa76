//! Advisory table locks shared between processes.
//!
//! A lock is a marker file `<dir>/<table>.lock` created with `create_new`,
//! so at most one holder exists per table across every process using the
//! directory. The marker records who took it and when; its modification
//! time decides staleness. A [`LockGuard`] removes its marker on drop.
//!
//! Reclaiming a stale marker happens under a second marker,
//! `<table>.lock.reclaim`, and staleness is checked again once it is held.
//! Two processes that both saw the same stale marker therefore cannot both
//! remove it and each go on to take the lock.
//!
//! Within one process, callers must serialize their own use of a table;
//! the marker does not distinguish threads of one holder.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use quill_core::{Error, Result};
use tracing::{debug, warn};

use crate::file;

/// Extension of lock marker files.
pub const LOCK_EXTENSION: &str = "lock";

const RECLAIM_EXTENSION: &str = "reclaim";

static NEXT_HOLDER: AtomicU64 = AtomicU64::new(0);

/// Timing parameters of lock acquisition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockConfig {
    /// Give up with `DatabaseBusy` after this long.
    pub timeout: Duration,
    /// Pause between attempts while the marker exists.
    pub retry_interval: Duration,
    /// Markers older than this are reclaimed by `acquire`; None disables it.
    pub stale_after: Option<Duration>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            retry_interval: Duration::from_millis(100),
            stale_after: Some(Duration::from_secs(300)),
        }
    }
}

/// File-marker lock manager for one data directory.
#[derive(Debug)]
pub struct LockManager {
    dir: PathBuf,
    config: LockConfig,
    holder: String,
}

impl LockManager {
    pub fn new(dir: impl Into<PathBuf>, config: LockConfig) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let holder = format!(
            "{}-{}-{}",
            std::process::id(),
            nanos,
            NEXT_HOLDER.fetch_add(1, Ordering::Relaxed)
        );
        Self {
            dir: dir.into(),
            config,
            holder,
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Identity written into markers created by this manager.
    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn marker_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", table, LOCK_EXTENSION))
    }

    fn reclaim_path(&self, table: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}.{}", table, LOCK_EXTENSION, RECLAIM_EXTENSION))
    }

    /// Makes one attempt to create the marker.
    pub fn try_acquire(&self, table: &str) -> Result<Option<LockGuard>> {
        let path = self.marker_path(table);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut marker) => {
                let acquired_at = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or_default();
                let body = format!(
                    "holder: {}\npid: {}\nacquired_at: {:.3}\n",
                    self.holder,
                    std::process::id(),
                    acquired_at
                );
                if let Err(e) = marker.write_all(body.as_bytes()) {
                    let _ = fs::remove_file(&path);
                    return Err(Error::io(format!("writing lock marker {}", path.display()), e));
                }
                Ok(Some(LockGuard {
                    table: table.to_string(),
                    path,
                    holder: self.holder.clone(),
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(Error::io(format!("creating lock marker {}", path.display()), e)),
        }
    }

    /// Acquires the lock on `table`, retrying every `retry_interval` until
    /// `timeout` elapses. A stale marker met on the way is reclaimed.
    pub fn acquire(&self, table: &str) -> Result<LockGuard> {
        let started = Instant::now();
        let mut contended = false;
        loop {
            if let Some(guard) = self.try_acquire(table)? {
                if contended {
                    debug!(table, waited_ms = started.elapsed().as_millis() as u64, "lock acquired after wait");
                }
                return Ok(guard);
            }
            if let Some(max_age) = self.config.stale_after {
                if self.reclaim_if_stale(table, max_age)? {
                    warn!(table, "reclaimed stale lock");
                    continue;
                }
            }
            let waited = started.elapsed();
            if waited >= self.config.timeout {
                warn!(table, waited_ms = waited.as_millis() as u64, "lock acquisition timed out");
                return Err(Error::busy(table, waited));
            }
            contended = true;
            let remaining = self.config.timeout - waited;
            thread::sleep(self.config.retry_interval.min(remaining));
        }
    }

    /// Acquires several locks in name order, so that two callers locking
    /// overlapping sets cannot wait on each other forever. On failure the
    /// locks taken so far are released.
    pub fn acquire_all<S: AsRef<str>>(&self, tables: &[S]) -> Result<Vec<LockGuard>> {
        let mut names: Vec<&str> = tables.iter().map(AsRef::as_ref).collect();
        names.sort_unstable();
        names.dedup();
        let mut guards = Vec::with_capacity(names.len());
        for name in names {
            guards.push(self.acquire(name)?);
        }
        Ok(guards)
    }

    /// Removes the marker of `table`, whoever holds it. Releasing a table
    /// that is not locked is a no-op.
    pub fn release(&self, table: &str) -> Result<()> {
        file::remove_if_exists(&self.marker_path(table))?;
        Ok(())
    }

    pub fn is_locked(&self, table: &str) -> bool {
        self.marker_path(table).exists()
    }

    /// Whether the marker of `table` exists and is older than `max_age`.
    pub fn is_stale(&self, table: &str, max_age: Duration) -> Result<bool> {
        marker_age(&self.marker_path(table)).map(|age| age.map_or(false, |a| a > max_age))
    }

    /// Removes every marker in the directory older than `max_age` and
    /// returns the tables they belonged to.
    pub fn reclaim_stale(&self, max_age: Duration) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(format!("listing {}", self.dir.display()), e)),
        };
        let mut reclaimed = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| Error::io(format!("listing {}", self.dir.display()), e))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOCK_EXTENSION) {
                continue;
            }
            let table = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem.to_string(),
                None => continue,
            };
            if self.reclaim_if_stale(&table, max_age)? {
                warn!(table = table.as_str(), "reclaimed stale lock");
                reclaimed.push(table);
            }
        }
        reclaimed.sort();
        Ok(reclaimed)
    }

    /// Removes the marker of `table` if it is older than `max_age`.
    ///
    /// The decision is made while holding the reclaim marker, so a marker
    /// that another process reclaimed and re-created in the meantime is
    /// seen as fresh and left alone. Returns false when the marker is fresh,
    /// absent, or another reclaim is in progress.
    fn reclaim_if_stale(&self, table: &str, max_age: Duration) -> Result<bool> {
        let gate = self.reclaim_path(table);
        match OpenOptions::new().write(true).create_new(true).open(&gate) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                // left behind by a reclaimer that died
                if marker_age(&gate)?.map_or(false, |age| age > max_age) {
                    file::remove_if_exists(&gate)?;
                }
                return Ok(false);
            }
            Err(e) => return Err(Error::io(format!("creating reclaim marker {}", gate.display()), e)),
        }

        let path = self.marker_path(table);
        let reclaimed = match marker_age(&path) {
            Ok(Some(age)) if age > max_age => file::remove_if_exists(&path),
            Ok(_) => Ok(false),
            Err(e) => Err(e),
        };
        if let Err(e) = fs::remove_file(&gate) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(table, error = %e, "failed to remove reclaim marker");
            }
        }
        reclaimed
    }
}

fn marker_age(path: &Path) -> Result<Option<Duration>> {
    match fs::metadata(path) {
        Ok(meta) => {
            let modified = meta
                .modified()
                .map_err(|e| Error::io(format!("reading mtime of {}", path.display()), e))?;
            Ok(Some(SystemTime::now().duration_since(modified).unwrap_or_default()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(format!("reading metadata of {}", path.display()), e)),
    }
}

/// A held table lock. Dropping it removes the marker, unless the marker
/// was reclaimed and re-created by another holder meanwhile.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    table: String,
    path: PathBuf,
    holder: String,
}

impl LockGuard {
    pub fn table(&self) -> &str {
        &self.table
    }

    fn still_ours(&self) -> bool {
        let mut body = String::new();
        match fs::File::open(&self.path).and_then(|mut f| f.read_to_string(&mut body)) {
            Ok(_) => body
                .lines()
                .any(|line| line.strip_prefix("holder: ") == Some(self.holder.as_str())),
            Err(_) => false,
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.still_ours() {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(table = self.table.as_str(), error = %e, "failed to remove lock marker");
            }
        }
    }
}
