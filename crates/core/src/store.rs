//! Persistence adapters: uniform read/write of a buffer's content.
//! 持久化介面：以一致方式讀寫緩衝區內容。

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::util::{owner_token, write_atomic};
use crate::SourceRef;

/// 儲存層錯誤。 / Errors reported by a persistence adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{target} was not found")]
    NotFound { target: String },
    #[error("permission denied for {target}")]
    PermissionDenied { target: String },
    #[error("I/O failure on {target}: {error}")]
    IoFailure {
        target: String,
        #[source]
        error: io::Error,
    },
    #[error("malformed data in {target}: {reason}")]
    MalformedData { target: String, reason: String },
}

impl StoreError {
    pub fn not_found(target: impl ToString) -> Self {
        StoreError::NotFound {
            target: target.to_string(),
        }
    }

    /// 將 `io::Error` 對應到錯誤分類。 / Maps an `io::Error` onto the store taxonomy.
    pub fn from_io(target: impl ToString, error: io::Error) -> Self {
        let target = target.to_string();
        match error.kind() {
            ErrorKind::NotFound => StoreError::NotFound { target },
            ErrorKind::PermissionDenied => StoreError::PermissionDenied { target },
            ErrorKind::InvalidData => StoreError::MalformedData {
                target,
                reason: error.to_string(),
            },
            _ => StoreError::IoFailure { target, error },
        }
    }
}

/// 後端儲存的一致介面。 / Uniform access to a backing store.
///
/// Writes take `&mut self`, so two writes can never overlap; the session keeps a
/// single tab per logical source, which makes every buffer single-writer.
pub trait PersistenceAdapter {
    fn read(&self, source: &SourceRef) -> Result<String, StoreError>;

    fn write(&mut self, source: &SourceRef, content: &str) -> Result<(), StoreError>;

    /// Pushes batched writes to durable storage. Stores that write through do nothing.
    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// 以資料夾為根的階層式檔案儲存。 / Hierarchical file store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 根目錄名稱，作為專案標題。 / Name of the root folder, used as the project title.
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string())
    }

    /// 列出根目錄下所有檔案（相對路徑，已排序）。 / Lists every file below the root as sorted relative paths.
    pub fn list_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|err| {
                let target = err
                    .path()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| self.root.display().to_string());
                match err.into_io_error() {
                    Some(io_err) => StoreError::from_io(target, io_err),
                    None => StoreError::IoFailure {
                        target,
                        error: io::Error::new(ErrorKind::Other, "filesystem loop"),
                    },
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                files.push(relative.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }

    /// 解析為根目錄下的路徑；根目錄外的來源一律拒絕。 / Resolves a source below the root, rejecting anything outside it.
    fn resolve(&self, source: &SourceRef) -> Result<PathBuf, StoreError> {
        let SourceRef::File(path) = source else {
            return Err(StoreError::not_found(source));
        };
        let outside = || StoreError::PermissionDenied {
            target: path.display().to_string(),
        };
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root).map_err(|_| outside())?
        } else {
            path.as_path()
        };
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
        {
            return Err(outside());
        }
        Ok(self.root.join(relative))
    }
}

impl PersistenceAdapter for FileStore {
    fn read(&self, source: &SourceRef) -> Result<String, StoreError> {
        let path = self.resolve(source)?;
        fs::read_to_string(&path).map_err(|err| StoreError::from_io(path.display(), err))
    }

    fn write(&mut self, source: &SourceRef, content: &str) -> Result<(), StoreError> {
        let path = self.resolve(source)?;
        write_atomic(&path, content.as_bytes())
            .map_err(|err| StoreError::from_io(path.display(), err))?;
        debug!(path = %path.display(), bytes = content.len(), "file written");
        Ok(())
    }
}

/// 依使用者分隔的鍵值儲存。 / Flat key-value store scoped per owner.
///
/// Each owner's records live in one JSON object (`<root>/<owner-token>.json`).
/// Without a root the store is memory-only.
#[derive(Debug, Default)]
pub struct KeyValueStore {
    root: Option<PathBuf>,
    records: BTreeMap<String, BTreeMap<String, String>>,
}

impl KeyValueStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn open(root: impl AsRef<Path>) -> Self {
        Self {
            root: Some(root.as_ref().to_path_buf()),
            records: BTreeMap::new(),
        }
    }

    /// 列出使用者的所有鍵。 / Lists the keys stored for an owner.
    pub fn keys(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        let records = self.owner_records(owner)?;
        Ok(records.keys().cloned().collect())
    }

    /// 移除一筆紀錄；不存在時回傳 `false`。 / Removes a record, returning `false` when it was absent.
    pub fn remove(&mut self, owner: &str, key: &str) -> Result<bool, StoreError> {
        self.ensure_loaded(owner)?;
        let removed = self
            .records
            .get_mut(owner)
            .map(|records| records.remove(key).is_some())
            .unwrap_or(false);
        if removed {
            self.persist(owner)?;
        }
        Ok(removed)
    }

    fn owner_path(&self, owner: &str) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("{}.json", owner_token(owner))))
    }

    fn owner_records(&self, owner: &str) -> Result<BTreeMap<String, String>, StoreError> {
        if let Some(records) = self.records.get(owner) {
            return Ok(records.clone());
        }
        self.load_owner(owner)
    }

    fn load_owner(&self, owner: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let Some(path) = self.owner_path(owner) else {
            return Ok(BTreeMap::new());
        };
        match fs::read_to_string(&path) {
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|err| StoreError::MalformedData {
                    target: path.display().to_string(),
                    reason: err.to_string(),
                })
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(StoreError::from_io(path.display(), err)),
        }
    }

    fn ensure_loaded(&mut self, owner: &str) -> Result<(), StoreError> {
        if !self.records.contains_key(owner) {
            let loaded = self.load_owner(owner)?;
            self.records.insert(owner.to_string(), loaded);
        }
        Ok(())
    }

    fn persist(&self, owner: &str) -> Result<(), StoreError> {
        let (Some(path), Some(records)) = (self.owner_path(owner), self.records.get(owner)) else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(records).map_err(|err| StoreError::MalformedData {
            target: path.display().to_string(),
            reason: err.to_string(),
        })?;
        write_atomic(&path, &json).map_err(|err| StoreError::from_io(path.display(), err))
    }
}

impl PersistenceAdapter for KeyValueStore {
    fn read(&self, source: &SourceRef) -> Result<String, StoreError> {
        let SourceRef::Storage { owner, key } = source else {
            return Err(StoreError::not_found(source));
        };
        let value = match self.records.get(owner) {
            Some(records) => records.get(key).cloned(),
            None => self.load_owner(owner)?.remove(key),
        };
        value.ok_or_else(|| StoreError::not_found(source))
    }

    fn write(&mut self, source: &SourceRef, content: &str) -> Result<(), StoreError> {
        let SourceRef::Storage { owner, key } = source else {
            return Err(StoreError::not_found(source));
        };
        self.ensure_loaded(owner)?;
        let previous = self
            .records
            .entry(owner.clone())
            .or_default()
            .insert(key.clone(), content.to_string());
        if let Err(err) = self.persist(owner) {
            // Keep memory in step with what is durable.
            if let Some(records) = self.records.get_mut(owner) {
                match previous {
                    Some(old) => {
                        records.insert(key.clone(), old);
                    }
                    None => {
                        records.remove(key);
                    }
                }
            }
            return Err(err);
        }
        debug!(owner = %owner, key = %key, "record stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_reads_and_writes_relative_paths() {
        let tmp = tempdir().unwrap();
        let mut store = FileStore::new(tmp.path());
        let source = SourceRef::file("site/index.html");

        assert!(matches!(store.read(&source), Err(StoreError::NotFound { .. })));
        store.write(&source, "<p>hi</p>").unwrap();
        assert_eq!(store.read(&source).unwrap(), "<p>hi</p>");
        assert_eq!(store.list_files().unwrap(), vec![PathBuf::from("site/index.html")]);
    }

    #[test]
    fn file_store_rejects_foreign_sources() {
        let tmp = tempdir().unwrap();
        let store = FileStore::new(tmp.path());
        let err = store.read(&SourceRef::storage("me", "a.css")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn file_store_stays_inside_its_root() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("site");
        let mut store = FileStore::new(&root);

        for escaping in [
            SourceRef::file("../outside.txt"),
            SourceRef::file("nested/../../outside.txt"),
            SourceRef::file(tmp.path().join("outside.txt")),
        ] {
            assert!(matches!(
                store.write(&escaping, "x"),
                Err(StoreError::PermissionDenied { .. })
            ));
            assert!(matches!(
                store.read(&escaping),
                Err(StoreError::PermissionDenied { .. })
            ));
        }
        assert!(!tmp.path().join("outside.txt").exists());

        let inside = SourceRef::file(root.join("page.html"));
        store.write(&inside, "<p>in</p>").unwrap();
        assert_eq!(store.read(&SourceRef::file("./page.html")).unwrap(), "<p>in</p>");
    }

    #[test]
    fn io_errors_map_onto_the_taxonomy() {
        let cases = [
            (ErrorKind::NotFound, "NotFound"),
            (ErrorKind::PermissionDenied, "PermissionDenied"),
            (ErrorKind::InvalidData, "MalformedData"),
            (ErrorKind::Other, "IoFailure"),
        ];
        for (kind, expected) in cases {
            let err = StoreError::from_io("a.txt", io::Error::new(kind, "boom"));
            let variant = match &err {
                StoreError::NotFound { .. } => "NotFound",
                StoreError::PermissionDenied { .. } => "PermissionDenied",
                StoreError::MalformedData { .. } => "MalformedData",
                StoreError::IoFailure { .. } => "IoFailure",
            };
            assert_eq!(variant, expected, "{kind:?}");
            assert!(err.to_string().contains("a.txt"));
        }
    }

    #[test]
    fn key_value_store_persists_per_owner() {
        let tmp = tempdir().unwrap();
        let source = SourceRef::storage("alice", "main.js");
        {
            let mut store = KeyValueStore::open(tmp.path());
            store.write(&source, "let x = 1;").unwrap();
        }
        let store = KeyValueStore::open(tmp.path());
        assert_eq!(store.read(&source).unwrap(), "let x = 1;");
        assert!(store.read(&SourceRef::storage("bob", "main.js")).is_err());
        assert_eq!(store.keys("alice").unwrap(), vec!["main.js".to_string()]);
    }

    #[test]
    fn key_value_store_remove() {
        let mut store = KeyValueStore::in_memory();
        let source = SourceRef::storage("alice", "notes");
        store.write(&source, "x").unwrap();
        assert!(store.remove("alice", "notes").unwrap());
        assert!(!store.remove("alice", "notes").unwrap());
        assert!(store.read(&source).is_err());
    }
}
