//! Durable table files.
//!
//! A table lives in `<dir>/<table>.json` as a JSON array of row objects,
//! each mapping every column name to its value in schema order. Files are
//! only ever replaced whole through [`write_atomic`].

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use quill_core::schema::{Column, Table};
use quill_core::{Error, Result, Row, Value};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use tempfile::NamedTempFile;

/// Extension of durable table files.
pub const TABLE_EXTENSION: &str = "json";

/// Path of the durable file for `table` inside `dir`.
pub fn table_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{}.{}", table, TABLE_EXTENSION))
}

/// Modification time and length of a durable file, used to notice that
/// another process replaced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStamp {
    modified: SystemTime,
    len: u64,
}

/// Returns the stamp of `path`, or None if it does not exist.
pub fn stamp(path: &Path) -> Result<Option<FileStamp>> {
    match fs::metadata(path) {
        Ok(meta) => {
            let modified = meta
                .modified()
                .map_err(|e| Error::io(format!("reading mtime of {}", path.display()), e))?;
            Ok(Some(FileStamp {
                modified,
                len: meta.len(),
            }))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(format!("reading metadata of {}", path.display()), e)),
    }
}

/// Replaces `path` with `bytes` so that readers see either the old or the
/// new content, never a mix.
///
/// The data goes to a temporary file in the same directory, is flushed to
/// stable storage, then renamed over `path`. On failure before the rename
/// the previous file is untouched and the temporary file is removed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = parent_dir(path);
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| Error::io(format!("creating temporary file in {}", dir.display()), e))?;
    let written = tmp.write_all(bytes);
    written
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| Error::io(format!("writing temporary file for {}", path.display()), e))?;
    tmp.persist(path)
        .map_err(|e| Error::io(format!("replacing {}", path.display()), e.error))?;
    sync_dir(dir)
}

/// Renames `from` over `to` and makes the rename durable.
pub fn rename_durable(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| {
        Error::io(format!("renaming {} to {}", from.display(), to.display()), e)
    })?;
    sync_dir(parent_dir(to))
}

/// Removes a file, treating an already missing file as success.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(format!("removing {}", path.display()), e)),
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Flushes directory metadata so a completed rename survives a crash.
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| Error::io(format!("syncing directory {}", dir.display()), e))
}

#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

struct RowObject<'a> {
    columns: &'a [Column],
    values: &'a [Value],
}

impl Serialize for RowObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column.name(), value)?;
        }
        map.end()
    }
}

struct RowArray<'a, I> {
    columns: &'a [Column],
    rows: I,
}

impl<'a, I> Serialize for RowArray<'a, I>
where
    I: Iterator<Item = &'a Row> + Clone,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        for row in self.rows.clone() {
            seq.serialize_element(&RowObject {
                columns: self.columns,
                values: row.values(),
            })?;
        }
        seq.end()
    }
}

/// Serializes rows as a JSON array of objects in schema column order.
pub fn encode_rows<'a, I>(schema: &'a Table, rows: I) -> Result<Vec<u8>>
where
    I: Iterator<Item = &'a Row> + Clone,
{
    let array = RowArray {
        columns: schema.columns(),
        rows,
    };
    serde_json::to_vec_pretty(&array)
        .map_err(|e| Error::io(format!("encoding table {}", schema.name()), e.into()))
}

/// Parses a durable file. Any deviation from the schema (missing or extra
/// columns, wrong value types, non-object rows) is corruption.
pub fn decode_rows(schema: &Table, bytes: &[u8]) -> Result<Vec<Vec<Value>>> {
    let table = schema.name();
    let objects: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_slice(bytes)
        .map_err(|e| Error::corruption(table, format!("not a JSON array of row objects: {}", e)))?;

    let mut rows = Vec::with_capacity(objects.len());
    for (n, mut object) in objects.into_iter().enumerate() {
        let mut values = Vec::with_capacity(schema.column_count());
        for column in schema.columns() {
            let raw = object.remove(column.name()).ok_or_else(|| {
                Error::corruption(table, format!("row {} is missing column '{}'", n, column.name()))
            })?;
            let value: Value = serde_json::from_value(raw).map_err(|e| {
                Error::corruption(table, format!("row {} column '{}': {}", n, column.name(), e))
            })?;
            let value = value.cast_for_column(column.data_type()).ok_or_else(|| {
                Error::corruption(
                    table,
                    format!("row {} column '{}' is not {}", n, column.name(), column.data_type()),
                )
            })?;
            values.push(value);
        }
        if let Some(extra) = object.keys().next() {
            return Err(Error::corruption(
                table,
                format!("row {} has undeclared column '{}'", n, extra),
            ));
        }
        rows.push(values);
    }
    Ok(rows)
}
