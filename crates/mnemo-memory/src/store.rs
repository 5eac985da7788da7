//! Filesystem record store.
//!
//! Every write goes to a hidden temporary file in the target directory and is
//! then renamed over the destination, so a concurrent reader sees either the
//! old file or the new one and never a partial write.  There is no locking:
//! the store assumes a single writer at a time.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mnemo_types::{RECORD_EXTENSION, Record};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::codec::{CodecError, RecordCodec};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error("not a file path: {0}")]
    InvalidPath(PathBuf),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// `true` for `*.memory.md` paths.
pub fn is_record_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(RECORD_EXTENSION) && !n.starts_with('.'))
}

/// Replace `path` with `contents` via write-temp-then-rename.
///
/// Parent directories are created as needed.  The temporary file is removed
/// when any step fails.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return Err(StoreError::InvalidPath(path.to_path_buf()));
    };
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let tmp = dir.join(format!(".{}.{}.tmp", name.to_string_lossy(), Uuid::new_v4()));
    if let Err(e) = fs::write(&tmp, contents) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io(&tmp, e));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        error!(path = %path.display(), error = %e, "failed to rename temporary record file");
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io(path, e));
    }
    debug!(path = %path.display(), bytes = contents.len(), "wrote record file");
    Ok(())
}

/// Reads and writes record files through a [`RecordCodec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordStore {
    codec: RecordCodec,
}

impl RecordStore {
    pub fn new(codec: RecordCodec) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &RecordCodec {
        &self.codec
    }

    pub fn read(&self, path: &Path) -> Result<Record, StoreError> {
        let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        self.codec.parse(&text).map_err(|source| StoreError::Codec {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write(&self, path: &Path, record: &Record) -> Result<(), StoreError> {
        let text = self.codec.serialize(record).map_err(|source| StoreError::Codec {
            path: path.to_path_buf(),
            source,
        })?;
        write_atomic(path, &text)
    }

    /// Every record file under `roots`, sorted and deduplicated.  Missing
    /// roots contribute nothing.
    pub fn list(&self, roots: &[PathBuf]) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = roots
            .iter()
            .filter(|root| root.is_dir())
            .flat_map(|root| {
                WalkDir::new(root)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file() && is_record_file(e.path()))
                    .map(|e| e.into_path())
            })
            .collect();
        files.sort();
        files.dedup();
        files
    }

    /// Every readable record under `roots`.  Unreadable files are logged and
    /// skipped.
    pub fn load_all(&self, roots: &[PathBuf]) -> Vec<(PathBuf, Record)> {
        self.list(roots)
            .into_iter()
            .filter_map(|path| match self.read(&path) {
                Ok(record) => Some((path, record)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable record");
                    None
                }
            })
            .collect()
    }

    /// Locate the record whose header id is `id`.
    ///
    /// Files named `{id}.memory.md` are checked first; otherwise every
    /// header under `roots` is scanned.
    pub fn find_by_id(&self, roots: &[PathBuf], id: &str) -> Option<PathBuf> {
        let files = self.list(roots);
        let conventional = format!("{id}{RECORD_EXTENSION}");
        let named = files
            .iter()
            .filter(|p| p.file_name().is_some_and(|n| n == conventional.as_str()));
        for path in named {
            if self.read(path).is_ok_and(|r| r.header.id == id) {
                return Some(path.clone());
            }
        }
        files
            .into_iter()
            .find(|p| self.read(p).is_ok_and(|r| r.header.id == id))
    }

    /// Header id → path for every readable record under `roots`, from one
    /// walk.  UUID ids are keyed in canonical lowercase form; when two files
    /// share an id the first in path order wins.
    pub fn id_index(&self, roots: &[PathBuf]) -> HashMap<String, PathBuf> {
        let mut index = HashMap::new();
        for (path, record) in self.load_all(roots) {
            if record.header.id.trim().is_empty() {
                continue;
            }
            index.entry(index_key(&record.header.id)).or_insert(path);
        }
        index
    }
}

fn index_key(id: &str) -> String {
    Uuid::try_parse(id.trim())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| id.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mnemo_types::CognitiveType;

    fn record(title: &str) -> Record {
        Record::new(CognitiveType::Semantic, "decisions", title, Utc::now()).with_body("body\n")
    }

    // ── atomic writes ────────────────────────────────────────────────────────

    #[test]
    fn write_creates_parents_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::default();
        let rec = record("a");
        let path = dir.path().join("semantic/decisions").join(rec.file_name());
        store.write(&path, &rec).unwrap();
        assert_eq!(store.read(&path).unwrap(), rec);

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.memory.md");
        write_atomic(&path, "old").unwrap();
        write_atomic(&path, "new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn failed_rename_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be replaced by a file.
        let target = dir.path().join("occupied.memory.md");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), "x").unwrap();
        assert!(write_atomic(&target, "data").is_err());
        assert!(target.join("keep").exists());
        let temps = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(temps, 0);
    }

    // ── discovery ────────────────────────────────────────────────────────────

    #[test]
    fn list_finds_records_recursively_and_ignores_others() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::default();
        let a = dir.path().join("semantic/decisions/a.memory.md");
        let b = dir.path().join("episodic/incidents/deep/b.memory.md");
        store.write(&a, &record("a")).unwrap();
        store.write(&b, &record("b")).unwrap();
        fs::write(dir.path().join("semantic/notes.md"), "x").unwrap();

        let roots = vec![dir.path().to_path_buf(), dir.path().join("semantic"), dir.path().join("absent")];
        let files = store.list(&roots);
        assert_eq!(files, vec![b, a]);
    }

    #[test]
    fn id_index_covers_every_record_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::default();
        let a = record("a");
        let b = record("b");
        let a_path = dir.path().join("semantic/decisions").join(a.file_name());
        let b_path = dir.path().join("episodic/sessions/b.memory.md");
        store.write(&a_path, &a).unwrap();
        store.write(&b_path, &b).unwrap();
        fs::write(dir.path().join("semantic/broken.memory.md"), "no header").unwrap();

        let index = store.id_index(&[dir.path().to_path_buf()]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&a.header.id), Some(&a_path));
        assert_eq!(index.get(&b.header.id), Some(&b_path));
    }

    #[test]
    fn find_by_id_uses_file_name_then_header_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::default();
        let named = record("named");
        let slugged = record("slugged");
        store
            .write(&dir.path().join("semantic/decisions").join(named.file_name()), &named)
            .unwrap();
        let slug_path = dir.path().join("semantic/decisions/use-slug.memory.md");
        store.write(&slug_path, &slugged).unwrap();

        let roots = vec![dir.path().to_path_buf()];
        assert!(store.find_by_id(&roots, &named.header.id).is_some());
        assert_eq!(store.find_by_id(&roots, &slugged.header.id), Some(slug_path));
        assert!(store.find_by_id(&roots, "00000000-0000-0000-0000-000000000000").is_none());
    }

    #[test]
    fn load_all_skips_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::default();
        store.write(&dir.path().join("ok.memory.md"), &record("ok")).unwrap();
        fs::write(dir.path().join("bad.memory.md"), "no header here").unwrap();
        let loaded = store.load_all(&[dir.path().to_path_buf()]);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].1.header.title, "ok");
    }
}
