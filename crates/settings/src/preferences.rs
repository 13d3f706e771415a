use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use livepad_core::{write_atomic, SaveMode, SessionOptions, SourceLanguage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const PREFERENCES_VERSION: u32 = 1;
const MAX_DEBOUNCE_MS: u64 = 10_000;

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("failed to read preferences {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse preferences {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize preferences {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write preferences {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub preview: PreviewPreferences,
    #[serde(default)]
    pub editor: EditorPreferences,
    #[serde(default)]
    pub projects: ProjectPreferences,
}

fn default_version() -> u32 {
    PREFERENCES_VERSION
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            version: PREFERENCES_VERSION,
            preview: PreviewPreferences::default(),
            editor: EditorPreferences::default(),
            projects: ProjectPreferences::default(),
        }
    }
}

impl Preferences {
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = PREFERENCES_VERSION;
        }
        self.preview.sanitize();
        self.projects.sanitize();
    }

    /// Session settings derived from these preferences.  
    /// 依偏好設定產生工作階段參數。
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            preview_delay: Duration::from_millis(self.preview.debounce_ms),
            save_mode: self.editor.save_mode.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewPreferences {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    1000
}

impl Default for PreviewPreferences {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl PreviewPreferences {
    fn sanitize(&mut self) {
        self.debounce_ms = self.debounce_ms.min(MAX_DEBOUNCE_MS);
    }
}

/// 儲存策略偏好。 / Persisted form of the session save mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SavePolicy {
    #[default]
    Manual,
    Auto,
}

impl From<SavePolicy> for SaveMode {
    fn from(policy: SavePolicy) -> Self {
        match policy {
            SavePolicy::Manual => SaveMode::Manual,
            SavePolicy::Auto => SaveMode::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EditorPreferences {
    #[serde(default)]
    pub save_mode: SavePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPreferences {
    #[serde(default = "default_languages")]
    pub default_languages: Vec<SourceLanguage>,
}

fn default_languages() -> Vec<SourceLanguage> {
    vec![
        SourceLanguage::Markup,
        SourceLanguage::Stylesheet,
        SourceLanguage::Script,
    ]
}

impl Default for ProjectPreferences {
    fn default() -> Self {
        Self {
            default_languages: default_languages(),
        }
    }
}

impl ProjectPreferences {
    fn sanitize(&mut self) {
        let mut seen = Vec::with_capacity(self.default_languages.len());
        self.default_languages.retain(|language| {
            if seen.contains(language) {
                false
            } else {
                seen.push(*language);
                true
            }
        });
        if self.default_languages.is_empty() {
            self.default_languages = default_languages();
        }
    }
}

#[derive(Debug)]
pub struct PreferencesStore {
    path: PathBuf,
    data: Preferences,
}

impl PreferencesStore {
    pub fn new(path: impl Into<PathBuf>, preferences: Preferences) -> Self {
        Self {
            path: path.into(),
            data: preferences,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PreferencesError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            debug!(path = %path.display(), "no preferences file, using defaults");
            let mut data = Preferences::default();
            data.sanitize();
            return Ok(Self { path, data });
        }

        let contents = fs::read_to_string(&path).map_err(|source| PreferencesError::Read {
            path: path.clone(),
            source,
        })?;
        let mut data: Preferences =
            serde_json::from_str(&contents).map_err(|source| PreferencesError::Parse {
                path: path.clone(),
                source,
            })?;
        data.sanitize();
        debug!(path = %path.display(), "preferences loaded");
        Ok(Self { path, data })
    }

    pub fn preferences(&self) -> &Preferences {
        &self.data
    }

    pub fn update<F>(&mut self, mut op: F) -> Result<(), PreferencesError>
    where
        F: FnMut(&mut Preferences),
    {
        op(&mut self.data);
        self.data.sanitize();
        self.save()
    }

    pub fn overwrite(&mut self, preferences: Preferences) -> Result<(), PreferencesError> {
        self.data = preferences;
        self.data.sanitize();
        self.save()
    }

    pub fn save(&self) -> Result<(), PreferencesError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| PreferencesError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let payload = serde_json::to_string_pretty(&self.data).map_err(|source| {
            PreferencesError::Serialize {
                path: self.path.clone(),
                source,
            }
        })?;
        write_atomic(&self.path, payload.as_bytes()).map_err(|source| PreferencesError::Write {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
