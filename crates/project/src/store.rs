use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use livepad_core::{
    owner_token, write_atomic, PersistenceAdapter, ProjectId, SourceLanguage, SourceRef,
    StoreError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::record::{normalize_name, ProjectRecord, ProjectSummary};
use crate::util::current_timestamp;

/// Current project list format version.
pub const PROJECT_LIST_VERSION: u32 = 1;

/// Errors raised by project persistence.  
/// 專案儲存相關的錯誤。
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project {0} not found")]
    NotFound(String),
    #[error("permission denied for {0}")]
    PermissionDenied(PathBuf),
    #[error("project store IO error at {path}: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed project data: {0}")]
    MalformedData(String),
    #[error("a project named {0:?} already exists")]
    DuplicateName(String),
}

impl ProjectError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            ErrorKind::PermissionDenied => ProjectError::PermissionDenied(path.to_path_buf()),
            _ => ProjectError::IoFailure {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

impl From<ProjectError> for StoreError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::NotFound(target) => StoreError::NotFound { target },
            ProjectError::PermissionDenied(path) => StoreError::PermissionDenied {
                target: path.display().to_string(),
            },
            ProjectError::IoFailure { path, source } => StoreError::IoFailure {
                target: path.display().to_string(),
                error: source,
            },
            other @ (ProjectError::MalformedData(_) | ProjectError::DuplicateName(_)) => {
                StoreError::MalformedData {
                    target: "project store".into(),
                    reason: other.to_string(),
                }
            }
        }
    }
}

/// Explicit answer to a destructive prompt.  
/// 破壞性操作的明確確認。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProjectListFile {
    #[serde(default = "default_version")]
    format_version: u32,
    #[serde(default)]
    projects: Vec<ProjectRecord>,
}

fn default_version() -> u32 {
    PROJECT_LIST_VERSION
}

/// Owns every owner's project list; persists a list as one unit.  
/// 管理各使用者的專案清單，並以整份清單為單位寫入。
///
/// Slot writes coming from the editing session only touch memory; `flush`
/// writes the affected lists.
#[derive(Debug)]
pub struct ProjectStore {
    root: PathBuf,
    lists: BTreeMap<String, Vec<ProjectRecord>>,
    unsaved: BTreeSet<String>,
}

impl ProjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            lists: BTreeMap::new(),
            unsaved: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn list_path(&self, owner: &str) -> PathBuf {
        self.root.join(format!("projects_{}.json", owner_token(owner)))
    }

    /// Lists the owner's projects in creation order.  
    /// 依建立順序列出使用者的專案。
    pub fn list(&mut self, owner: &str) -> Result<Vec<ProjectSummary>, ProjectError> {
        Ok(self
            .projects(owner)?
            .iter()
            .map(ProjectRecord::summary)
            .collect())
    }

    /// Loads (if needed) and returns the owner's records.  
    /// 載入並回傳使用者的專案紀錄。
    pub fn projects(&mut self, owner: &str) -> Result<&[ProjectRecord], ProjectError> {
        self.ensure_loaded(owner)?;
        Ok(self
            .lists
            .get(owner)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// Finds a record among the loaded lists.  
    /// 在已載入的清單中尋找專案。
    pub fn get(&self, id: &ProjectId) -> Option<&ProjectRecord> {
        self.lists
            .values()
            .flat_map(|projects| projects.iter())
            .find(|record| record.id == *id)
    }

    pub fn owner_of(&self, id: &ProjectId) -> Option<&str> {
        self.lists
            .iter()
            .find(|(_, projects)| projects.iter().any(|record| record.id == *id))
            .map(|(owner, _)| owner.as_str())
    }

    /// Creates a project with starter templates and persists the list.  
    /// 建立專案（含起始樣板）並寫入整份清單。
    pub fn create(
        &mut self,
        owner: &str,
        name: &str,
        languages: impl IntoIterator<Item = SourceLanguage>,
    ) -> Result<ProjectRecord, ProjectError> {
        let mut record = ProjectRecord::new(name, languages);
        record.validate()?;
        if self.name_taken(owner, &record.name)? {
            return Err(ProjectError::DuplicateName(record.name));
        }
        record.created_at_unix = Some(current_timestamp());
        self.insert(owner, record.clone())?;
        info!(owner, project = %record.id, name = %record.name, "project created");
        Ok(record)
    }

    /// Renames a project; the new name must be unique for the owner.  
    /// 重新命名專案；名稱在同一使用者下必須唯一。
    pub fn rename(&mut self, owner: &str, id: &ProjectId, name: &str) -> Result<(), ProjectError> {
        let name = normalize_name(name);
        self.ensure_loaded(owner)?;
        let projects = self.lists.entry(owner.to_string()).or_default();
        if projects
            .iter()
            .any(|record| record.name == name && record.id != *id)
        {
            return Err(ProjectError::DuplicateName(name));
        }
        let record = projects
            .iter_mut()
            .find(|record| record.id == *id)
            .ok_or_else(|| ProjectError::NotFound(id.to_string()))?;
        let previous = std::mem::replace(&mut record.name, name);
        if let Err(err) = self.persist(owner) {
            if let Some(record) = self.find_mut(id) {
                record.name = previous;
            }
            return Err(err);
        }
        Ok(())
    }

    /// Deletes a project once confirmed; returns whether anything was removed.  
    /// 經確認後刪除專案；回傳是否確實刪除。
    pub fn delete(
        &mut self,
        owner: &str,
        id: &ProjectId,
        confirmation: Confirmation,
    ) -> Result<bool, ProjectError> {
        if confirmation == Confirmation::Declined {
            debug!(owner, project = %id, "deletion declined");
            return Ok(false);
        }
        self.ensure_loaded(owner)?;
        let projects = self.lists.entry(owner.to_string()).or_default();
        let index = projects
            .iter()
            .position(|record| record.id == *id)
            .ok_or_else(|| ProjectError::NotFound(id.to_string()))?;
        let removed = projects.remove(index);
        if let Err(err) = self.persist(owner) {
            self.lists
                .entry(owner.to_string())
                .or_default()
                .insert(index, removed);
            return Err(err);
        }
        info!(owner, project = %id, "project deleted");
        Ok(true)
    }

    /// Imports an exported project under a fresh identity.  
    /// 以新的識別碼匯入專案。
    ///
    /// A name already used by the owner gets a ` (2)`, ` (3)`, … suffix.
    pub fn import_serialized(
        &mut self,
        owner: &str,
        blob: &str,
    ) -> Result<ProjectRecord, ProjectError> {
        let mut record = ProjectRecord::from_serialized(blob)?;
        record.id = ProjectId::new();
        record.name = self.unique_name(owner, &record.name)?;
        if record.created_at_unix.is_none() {
            record.created_at_unix = Some(current_timestamp());
        }
        self.insert(owner, record.clone())?;
        info!(owner, project = %record.id, name = %record.name, "project imported");
        Ok(record)
    }

    /// Exports a loaded project.  
    /// 匯出已載入的專案。
    pub fn export_serialized(&self, id: &ProjectId) -> Result<String, ProjectError> {
        self.get(id)
            .ok_or_else(|| ProjectError::NotFound(id.to_string()))?
            .to_serialized()
    }

    /// Writes every list that has pending slot edits.  
    /// 寫回所有含未儲存編輯的清單。
    pub fn save_pending(&mut self) -> Result<(), ProjectError> {
        let owners: Vec<String> = self.unsaved.iter().cloned().collect();
        for owner in owners {
            self.persist(&owner)?;
        }
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        !self.unsaved.is_empty()
    }

    fn insert(&mut self, owner: &str, record: ProjectRecord) -> Result<(), ProjectError> {
        self.ensure_loaded(owner)?;
        let id = record.id.clone();
        self.lists.entry(owner.to_string()).or_default().push(record);
        if let Err(err) = self.persist(owner) {
            if let Some(projects) = self.lists.get_mut(owner) {
                projects.retain(|record| record.id != id);
            }
            return Err(err);
        }
        Ok(())
    }

    fn name_taken(&mut self, owner: &str, name: &str) -> Result<bool, ProjectError> {
        Ok(self.projects(owner)?.iter().any(|record| record.name == name))
    }

    fn unique_name(&mut self, owner: &str, name: &str) -> Result<String, ProjectError> {
        if !self.name_taken(owner, name)? {
            return Ok(name.to_string());
        }
        let mut counter = 2;
        loop {
            let candidate = format!("{name} ({counter})");
            if !self.name_taken(owner, &candidate)? {
                return Ok(candidate);
            }
            counter += 1;
        }
    }

    fn find_mut(&mut self, id: &ProjectId) -> Option<&mut ProjectRecord> {
        self.lists
            .values_mut()
            .flat_map(|projects| projects.iter_mut())
            .find(|record| record.id == *id)
    }

    fn ensure_loaded(&mut self, owner: &str) -> Result<(), ProjectError> {
        if self.lists.contains_key(owner) {
            return Ok(());
        }
        let path = self.list_path(owner);
        let projects = match fs::read_to_string(&path) {
            Ok(contents) => {
                let file: ProjectListFile = serde_json::from_str(&contents)
                    .map_err(|err| ProjectError::MalformedData(format!("{}: {err}", path.display())))?;
                file.projects
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(ProjectError::from_io(&path, err)),
        };
        debug!(owner, count = projects.len(), "project list loaded");
        self.lists.insert(owner.to_string(), projects);
        Ok(())
    }

    fn persist(&mut self, owner: &str) -> Result<(), ProjectError> {
        let path = self.list_path(owner);
        let projects = self.lists.get(owner).cloned().unwrap_or_default();
        let file = ProjectListFile {
            format_version: PROJECT_LIST_VERSION,
            projects,
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|err| ProjectError::MalformedData(err.to_string()))?;
        fs::create_dir_all(&self.root).map_err(|err| ProjectError::from_io(&self.root, err))?;
        write_atomic(&path, &json).map_err(|err| ProjectError::from_io(&path, err))?;
        self.unsaved.remove(owner);
        Ok(())
    }
}

impl PersistenceAdapter for ProjectStore {
    fn read(&self, source: &SourceRef) -> Result<String, StoreError> {
        let SourceRef::ProjectSlot { project, language } = source else {
            return Err(StoreError::not_found(source));
        };
        self.get(project)
            .and_then(|record| record.buffer(*language))
            .map(str::to_string)
            .ok_or_else(|| StoreError::not_found(source))
    }

    fn write(&mut self, source: &SourceRef, content: &str) -> Result<(), StoreError> {
        let SourceRef::ProjectSlot { project, language } = source else {
            return Err(StoreError::not_found(source));
        };
        let owner = self
            .owner_of(project)
            .map(str::to_string)
            .ok_or_else(|| StoreError::not_found(source))?;
        let record = self
            .find_mut(project)
            .filter(|record| record.languages.contains(language))
            .ok_or_else(|| StoreError::not_found(source))?;
        record.buffers.insert(*language, content.to_string());
        self.unsaved.insert(owner);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if let Err(err) = self.save_pending() {
            warn!(error = %err, "failed to persist project lists");
            return Err(err.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_persists_and_reloads() {
        let tmp = tempdir().unwrap();
        let mut store = ProjectStore::new(tmp.path());
        let record = store
            .create("alice", "Demo", [SourceLanguage::Markup, SourceLanguage::Stylesheet])
            .unwrap();

        let mut reopened = ProjectStore::new(tmp.path());
        let list = reopened.list("alice").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, record.id);
        assert!(reopened.list("bob").unwrap().is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let tmp = tempdir().unwrap();
        let mut store = ProjectStore::new(tmp.path());
        store.create("alice", "Demo", [SourceLanguage::Markup]).unwrap();
        let err = store
            .create("alice", " Demo ", [SourceLanguage::Script])
            .unwrap_err();
        assert!(matches!(err, ProjectError::DuplicateName(_)));
        assert_eq!(store.list("alice").unwrap().len(), 1);
        store.create("bob", "Demo", [SourceLanguage::Markup]).unwrap();
    }

    #[test]
    fn empty_language_set_is_malformed() {
        let tmp = tempdir().unwrap();
        let mut store = ProjectStore::new(tmp.path());
        let err = store.create("alice", "Empty", Vec::<SourceLanguage>::new()).unwrap_err();
        assert!(matches!(err, ProjectError::MalformedData(_)));
    }

    #[test]
    fn declined_delete_keeps_the_project() {
        let tmp = tempdir().unwrap();
        let mut store = ProjectStore::new(tmp.path());
        let record = store.create("alice", "Keep", [SourceLanguage::Markup]).unwrap();
        assert!(!store.delete("alice", &record.id, Confirmation::Declined).unwrap());
        assert!(store.get(&record.id).is_some());
        assert!(store.delete("alice", &record.id, Confirmation::Confirmed).unwrap());
        assert!(store.get(&record.id).is_none());
        assert!(matches!(
            store.delete("alice", &record.id, Confirmation::Confirmed),
            Err(ProjectError::NotFound(_))
        ));
    }

    #[test]
    fn slot_writes_wait_for_flush() {
        let tmp = tempdir().unwrap();
        let mut store = ProjectStore::new(tmp.path());
        let record = store.create("alice", "Slots", [SourceLanguage::Markup]).unwrap();
        let slot = SourceRef::slot(record.id.clone(), SourceLanguage::Markup);

        store.write(&slot, "<p>edited</p>").unwrap();
        assert!(store.has_pending());
        assert_eq!(store.read(&slot).unwrap(), "<p>edited</p>");

        let mut other = ProjectStore::new(tmp.path());
        other.list("alice").unwrap();
        assert_ne!(other.read(&slot).unwrap(), "<p>edited</p>");

        store.flush().unwrap();
        assert!(!store.has_pending());
        let mut other = ProjectStore::new(tmp.path());
        other.list("alice").unwrap();
        assert_eq!(other.read(&slot).unwrap(), "<p>edited</p>");
    }

    #[test]
    fn slot_outside_the_project_languages_is_not_found() {
        let tmp = tempdir().unwrap();
        let mut store = ProjectStore::new(tmp.path());
        let record = store.create("alice", "Only html", [SourceLanguage::Markup]).unwrap();
        let slot = SourceRef::slot(record.id, SourceLanguage::Script);
        assert!(matches!(store.read(&slot), Err(StoreError::NotFound { .. })));
        assert!(matches!(store.write(&slot, "x"), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn rename_checks_uniqueness() {
        let tmp = tempdir().unwrap();
        let mut store = ProjectStore::new(tmp.path());
        let a = store.create("alice", "A", [SourceLanguage::Markup]).unwrap();
        store.create("alice", "B", [SourceLanguage::Markup]).unwrap();
        assert!(matches!(
            store.rename("alice", &a.id, "B"),
            Err(ProjectError::DuplicateName(_))
        ));
        store.rename("alice", &a.id, "C").unwrap();
        assert_eq!(store.get(&a.id).unwrap().name, "C");
    }

    #[test]
    fn io_errors_are_classified() {
        let path = Path::new("/srv/projects_x.json");
        let denied = ProjectError::from_io(path, io::Error::from(ErrorKind::PermissionDenied));
        assert!(matches!(&denied, ProjectError::PermissionDenied(p) if p == path));
        let other = ProjectError::from_io(path, io::Error::new(ErrorKind::Other, "disk gone"));
        assert!(matches!(&other, ProjectError::IoFailure { path: p, .. } if p == path));
    }

    #[test]
    fn project_errors_map_onto_the_store_taxonomy() {
        let path = PathBuf::from("/srv/projects_x.json");
        assert!(matches!(
            StoreError::from(ProjectError::NotFound("p1".into())),
            StoreError::NotFound { target } if target == "p1"
        ));
        assert!(matches!(
            StoreError::from(ProjectError::PermissionDenied(path.clone())),
            StoreError::PermissionDenied { target } if target == path.display().to_string()
        ));
        assert!(matches!(
            StoreError::from(ProjectError::IoFailure {
                path: path.clone(),
                source: io::Error::new(ErrorKind::Other, "disk gone"),
            }),
            StoreError::IoFailure { target, .. } if target == path.display().to_string()
        ));
        match StoreError::from(ProjectError::DuplicateName("Demo".into())) {
            StoreError::MalformedData { reason, .. } => assert!(reason.contains("Demo")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            StoreError::from(ProjectError::MalformedData("bad json".into())),
            StoreError::MalformedData { .. }
        ));
    }

    #[test]
    fn unreadable_list_surfaces_as_io_failure() {
        let tmp = tempdir().unwrap();
        let mut store = ProjectStore::new(tmp.path());
        let path = tmp.path().join(format!("projects_{}.json", owner_token("alice")));
        fs::create_dir_all(&path).unwrap();
        let err = store.list("alice").unwrap_err();
        assert!(matches!(err, ProjectError::IoFailure { .. }));
        assert!(matches!(StoreError::from(err), StoreError::IoFailure { .. }));
    }
}
