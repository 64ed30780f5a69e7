//! Atomic JSON persistence of snapshots.
//!
//! Every write goes to a temporary file next to its destination, is flushed and synced,
//! and is then renamed over the destination. Readers therefore see either the previous
//! content or the complete new content, never a torn file.

use super::path_utils::entity_file_name;
use super::{EntityId, EntitySnapshot, RunResult, SnapshotError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

const LOG_TARGET: &str = "     store";

type StoreResult<T> = Result<T, SnapshotError>;

/// Writes run results and per-entity snapshots, serializing writers of the same path.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    path_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn path_lock(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.path_locks.lock().expect("lock not poisoned");
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    /// Replace the file at `path` with the whole run result.
    pub async fn save(&self, path: &Path, result: &RunResult) -> StoreResult<()> {
        let lock = self.path_lock(path);
        let _guard = lock.lock().await;

        write_json_atomic(path, result)?;
        log::info!(target: LOG_TARGET, "Wrote {} entities to '{}'", result.len(), path.display());
        Ok(())
    }

    /// Check that `path` can take merged results: it is missing or holds a JSON object.
    ///
    /// Lets a caller reject an unusable target before doing any work for it.
    pub async fn check_mergeable(&self, path: &Path) -> StoreResult<()> {
        let lock = self.path_lock(path);
        let _guard = lock.lock().await;

        let _ = read_existing(path)?;
        Ok(())
    }

    /// Merge one entity into the run result file at `path`.
    ///
    /// Other entities keep their content and order. An existing entry for `id` is replaced
    /// in place; a new one is appended. A missing file is created. A file that exists but
    /// does not hold a JSON object is left untouched and reported as an error.
    pub async fn append_one(&self, path: &Path, id: &EntityId, snapshot: &EntitySnapshot) -> StoreResult<()> {
        let lock = self.path_lock(path);
        let _guard = lock.lock().await;

        let mut entries = read_existing(path)?.unwrap_or_default();
        insert_entry(&mut entries, id, snapshot)?;

        write_json_atomic(path, &entries)?;
        log::debug!(target: LOG_TARGET, "Merged '{id}' into '{}'", path.display());
        Ok(())
    }

    /// Merge every entity of `result` into the file at `path` with a single write.
    ///
    /// Follows the same rules as [`Self::append_one`], applied in the result's order.
    pub async fn merge(&self, path: &Path, result: &RunResult) -> StoreResult<()> {
        let lock = self.path_lock(path);
        let _guard = lock.lock().await;

        let mut entries = read_existing(path)?.unwrap_or_default();
        let before = entries.len();
        for (id, snapshot) in result.iter() {
            insert_entry(&mut entries, id, snapshot)?;
        }

        write_json_atomic(path, &entries)?;
        log::info!(
            target: LOG_TARGET,
            "Merged {} entities into '{}' ({} new)",
            result.len(),
            path.display(),
            entries.len() - before
        );
        Ok(())
    }

    /// Write one entity's snapshot to its own file in `dir`, returning the file's path.
    pub async fn save_entity(&self, dir: &Path, id: &EntityId, snapshot: &EntitySnapshot) -> StoreResult<PathBuf> {
        let path = dir.join(entity_file_name(id));
        let lock = self.path_lock(&path);
        let _guard = lock.lock().await;

        write_json_atomic(&path, snapshot)?;
        log::debug!(target: LOG_TARGET, "Wrote '{id}' to '{}'", path.display());
        Ok(path)
    }
}

fn insert_entry(entries: &mut Map<String, Value>, id: &EntityId, snapshot: &EntitySnapshot) -> StoreResult<()> {
    let value =
        serde_json::to_value(snapshot).map_err(|e| SnapshotError::persistence(format!("encoding snapshot of '{id}': {e}")))?;
    let _ = entries.insert(id.to_string(), value);
    Ok(())
}

/// Read the JSON object stored at `path`, or `None` if there is no such file.
fn read_existing(path: &Path) -> StoreResult<Option<Map<String, Value>>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SnapshotError::persistence(format!("reading '{}': {e}", path.display()))),
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err(SnapshotError::persistence(format!(
            "'{}' does not contain a JSON object, refusing to overwrite it",
            path.display()
        ))),
        Err(e) => Err(SnapshotError::persistence(format!(
            "'{}' is not valid JSON ({e}), refusing to overwrite it",
            path.display()
        ))),
    }
}

/// Pretty-print `value` to `path` atomically, with 2-space indentation and a trailing newline.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    write_atomic(path, |writer| {
        serde_json::to_writer_pretty(&mut *writer, value).map_err(io::Error::from)?;
        writer.write_all(b"\n")
    })
}

/// Write a file atomically: `fill` writes into a temporary file in the destination
/// directory, which replaces `path` only once it is complete and synced to disk.
///
/// If `fill` fails, the temporary file is removed and `path` keeps its previous content.
pub fn write_atomic<F>(path: &Path, fill: F) -> StoreResult<()>
where
    F: FnOnce(&mut BufWriter<&mut fs::File>) -> io::Result<()>,
{
    let persistence_err = |what: &str, e: &dyn core::fmt::Display| SnapshotError::persistence(format!("{what} '{}': {e}", path.display()));

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| persistence_err("creating parent directory of", &e))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| persistence_err("creating temporary file for", &e))?;

    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        fill(&mut writer).map_err(|e| persistence_err("writing", &e))?;
        writer.flush().map_err(|e| persistence_err("flushing", &e))?;
    }

    temp.as_file().sync_all().map_err(|e| persistence_err("syncing", &e))?;
    let _ = temp.persist(path).map_err(|e| persistence_err("replacing", &e.error))?;

    Ok(())
}
