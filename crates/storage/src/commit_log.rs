//! Multi-table commit protocol.
//!
//! Replacing several table files cannot be done with a single rename, so a
//! commit goes through four durable steps, all keyed by its [`CommitId`]:
//!
//! 1. [`CommitLog::prepare`]: each new table image is written to
//!    `<table>.json.<id>.pending` and flushed.
//! 2. [`CommitLog::seal`]: a marker `<id>.commit` naming the tables is
//!    written atomically. This is the commit point.
//! 3. [`CommitLog::apply`]: each pending file is renamed over its table file.
//! 4. [`CommitLog::finish`]: the marker is removed.
//!
//! Commits of different processes on disjoint tables run side by side and
//! never touch each other's files. [`CommitLog::recover`], run when a data
//! directory is opened with every table locked, finishes each interrupted
//! commit whose marker exists and discards pending files that no marker
//! names. A crash at any point therefore leaves either every old table
//! image of a commit or every new one.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use quill_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::file;

/// Extension of commit marker files.
pub const MARKER_EXTENSION: &str = "commit";

const PENDING_EXTENSION: &str = "pending";

static NEXT_COMMIT: AtomicU64 = AtomicU64::new(0);

/// Identity of one commit, unique among all processes sharing a directory.
///
/// Ids start with a zero-padded timestamp, so sorting them orders commits
/// by start time.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommitId(String);

impl CommitId {
    fn generate() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Self(format!(
            "{:020}-{}-{}",
            nanos,
            std::process::id(),
            NEXT_COMMIT.fetch_add(1, Ordering::Relaxed)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CommitMarker {
    tables: Vec<String>,
}

/// What [`CommitLog::recover`] found.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Recovery {
    /// Tables whose sealed new image was moved into place.
    pub rolled_forward: Vec<String>,
    /// Tables whose unsealed pending image was thrown away.
    pub discarded: Vec<String>,
}

impl Recovery {
    /// True when no interrupted commit was found.
    pub fn is_clean(&self) -> bool {
        self.rolled_forward.is_empty() && self.discarded.is_empty()
    }
}

/// Commit log for one data directory.
#[derive(Clone, Debug)]
pub struct CommitLog {
    dir: PathBuf,
}

impl CommitLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A fresh id for a commit about to be prepared.
    pub fn next_id(&self) -> CommitId {
        CommitId::generate()
    }

    fn marker_path(&self, id: &CommitId) -> PathBuf {
        self.dir.join(format!("{}.{}", id, MARKER_EXTENSION))
    }

    fn pending_path(&self, id: &CommitId, table: &str) -> PathBuf {
        self.dir.join(format!(
            "{}.{}.{}.{}",
            table,
            file::TABLE_EXTENSION,
            id,
            PENDING_EXTENSION
        ))
    }

    /// Writes the new image of `table` next to its durable file.
    pub fn prepare(&self, id: &CommitId, table: &str, bytes: &[u8]) -> Result<()> {
        file::write_atomic(&self.pending_path(id, table), bytes)
    }

    /// Makes the commit decision durable.
    pub fn seal(&self, id: &CommitId, tables: &[String]) -> Result<()> {
        let marker = CommitMarker {
            tables: tables.to_vec(),
        };
        let bytes = serde_json::to_vec(&marker)
            .map_err(|e| Error::io("encoding commit marker", e.into()))?;
        file::write_atomic(&self.marker_path(id), &bytes)
    }

    /// Moves every pending image of commit `id` over its table file. Tables
    /// whose pending image is already gone were applied before.
    pub fn apply(&self, id: &CommitId, tables: &[String]) -> Result<()> {
        for table in tables {
            let pending = self.pending_path(id, table);
            if pending.exists() {
                file::rename_durable(&pending, &file::table_path(&self.dir, table))?;
            }
        }
        Ok(())
    }

    /// Removes the marker of commit `id`, ending it.
    pub fn finish(&self, id: &CommitId) -> Result<()> {
        file::remove_if_exists(&self.marker_path(id))?;
        file::sync_dir(&self.dir)
    }

    /// Runs the whole protocol for `(table, new image)` pairs.
    ///
    /// If anything fails before the seal, the pending images are discarded
    /// and no table file has changed. Past the seal the commit stands: a
    /// failure to move the images into place is retried once, and if that
    /// fails too the marker is left for [`CommitLog::recover`].
    pub fn commit(&self, images: &[(String, Vec<u8>)]) -> Result<CommitId> {
        let id = self.next_id();
        let tables: Vec<String> = images.iter().map(|(t, _)| t.clone()).collect();
        let sealed = images
            .iter()
            .try_for_each(|(table, bytes)| self.prepare(&id, table, bytes))
            .and_then(|()| self.seal(&id, &tables));
        if let Err(e) = sealed {
            // The marker goes first so a crash here never seals a partial set.
            let _ = file::remove_if_exists(&self.marker_path(&id));
            for table in &tables {
                let _ = file::remove_if_exists(&self.pending_path(&id, table));
            }
            return Err(e);
        }
        if let Err(e) = self.complete(&id, &tables) {
            warn!(commit = %id, error = %e, "completing sealed commit failed, retrying");
            self.complete(&id, &tables)?;
        }
        info!(commit = %id, tables = ?tables, "committed");
        Ok(id)
    }

    fn complete(&self, id: &CommitId, tables: &[String]) -> Result<()> {
        self.apply(id, tables)?;
        self.finish(id)
    }

    /// Ids of every sealed commit whose marker is still present, oldest first.
    pub fn sealed(&self) -> Result<Vec<CommitId>> {
        let suffix = format!(".{}", MARKER_EXTENSION);
        let mut ids: Vec<CommitId> = self
            .file_names()?
            .into_iter()
            .filter_map(|name| name.strip_suffix(suffix.as_str()).map(|id| CommitId(id.to_string())))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Completes every interrupted sealed commit, oldest first, then
    /// discards the pending images no marker names.
    ///
    /// The caller must hold the locks of every table in the directory.
    pub fn recover(&self) -> Result<Recovery> {
        let mut recovery = Recovery::default();
        for id in self.sealed()? {
            let path = self.marker_path(&id);
            let bytes = fs::read(&path).map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
            let marker: CommitMarker = serde_json::from_slice(&bytes).map_err(|e| {
                Error::corruption(id.as_str(), format!("unreadable commit marker: {}", e))
            })?;
            self.complete(&id, &marker.tables)?;
            warn!(commit = %id, tables = ?marker.tables, "rolled forward interrupted commit");
            recovery.rolled_forward.extend(marker.tables);
        }

        // Every sealed commit is finished now, so what is left was never sealed.
        for name in self.file_names()? {
            if let Some(table) = pending_table(&name) {
                file::remove_if_exists(&self.dir.join(&name))?;
                recovery.discarded.push(table.to_string());
            }
        }
        if !recovery.discarded.is_empty() {
            warn!(tables = ?recovery.discarded, "discarded unsealed commit");
        }
        recovery.rolled_forward.sort();
        recovery.discarded.sort();
        Ok(recovery)
    }

    fn file_names(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(format!("listing {}", self.dir.display()), e)),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(format!("listing {}", self.dir.display()), e))?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

/// Table of a `<table>.json.<id>.pending` file name.
fn pending_table(name: &str) -> Option<&str> {
    let stem = name.strip_suffix(PENDING_EXTENSION)?.strip_suffix('.')?;
    let (table_file, _id) = stem.rsplit_once('.')?;
    table_file.strip_suffix(file::TABLE_EXTENSION)?.strip_suffix('.')
}
