use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::SourceLanguage;

/// 專案的穩定識別碼。 / Stable project identifier (UUID v4).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// 產生新的識別碼。 / Generates a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 指向後端儲存位置的參照（不擁有儲存本身）。 / Reference to a backing-store location; never owns the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceRef {
    /// File inside a hierarchical store.
    File(PathBuf),
    /// Record in a flat key-value store scoped to one owner.
    Storage { owner: String, key: String },
    /// Language slot of a project record.
    ProjectSlot {
        project: ProjectId,
        language: SourceLanguage,
    },
}

impl SourceRef {
    pub fn file(path: impl AsRef<Path>) -> Self {
        SourceRef::File(path.as_ref().to_path_buf())
    }

    pub fn storage(owner: impl Into<String>, key: impl Into<String>) -> Self {
        SourceRef::Storage {
            owner: owner.into(),
            key: key.into(),
        }
    }

    pub fn slot(project: ProjectId, language: SourceLanguage) -> Self {
        SourceRef::ProjectSlot { project, language }
    }

    /// 顯示在分頁上的名稱。 / Name shown on the tab.
    pub fn display_name(&self) -> String {
        match self {
            SourceRef::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned()),
            SourceRef::Storage { key, .. } => key.clone(),
            SourceRef::ProjectSlot { language, .. } => language.slot_file_name().to_string(),
        }
    }

    /// 判斷是否重複開啟時使用的鍵。 / Key used to detect a second open of the same logical source.
    ///
    /// Files compare by display name only, so two same-named files from different
    /// folders are treated as one source.
    pub fn logical_key(&self) -> String {
        match self {
            SourceRef::File(_) => format!("file:{}", self.display_name()),
            SourceRef::Storage { owner, key } => format!("storage:{owner}/{key}"),
            SourceRef::ProjectSlot { project, language } => {
                format!("slot:{project}/{language}")
            }
        }
    }

    /// 推斷來源語言。 / Language implied by the source.
    pub fn language(&self) -> SourceLanguage {
        match self {
            SourceRef::File(path) => SourceLanguage::from_path(path),
            SourceRef::Storage { key, .. } => SourceLanguage::from_path(key),
            SourceRef::ProjectSlot { language, .. } => *language,
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::File(path) => write!(f, "{}", path.display()),
            SourceRef::Storage { owner, key } => write!(f, "{owner}:{key}"),
            SourceRef::ProjectSlot { project, language } => {
                write!(f, "{project}/{}", language.slot_file_name())
            }
        }
    }
}
