use std::collections::{BTreeMap, BTreeSet};

use livepad_core::{starter_template, ProjectId, SourceLanguage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::ProjectError;

const DEFAULT_PROJECT_NAME: &str = "Untitled project";

/// A persisted group of per-language buffers.  
/// 依語言分組並整體儲存的專案紀錄。
///
/// The keys of `buffers` are always exactly `languages`. Fields this version does
/// not know about are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    #[serde(default = "default_name")]
    pub name: String,
    pub languages: BTreeSet<SourceLanguage>,
    pub buffers: BTreeMap<SourceLanguage, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_unix: Option<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_name() -> String {
    DEFAULT_PROJECT_NAME.to_string()
}

impl ProjectRecord {
    /// Creates a record whose slots hold the starter templates.  
    /// 建立新專案，各語言以起始樣板填入。
    pub fn new(name: impl Into<String>, languages: impl IntoIterator<Item = SourceLanguage>) -> Self {
        let languages: BTreeSet<SourceLanguage> = languages.into_iter().collect();
        let buffers = languages
            .iter()
            .map(|language| (*language, starter_template(*language).to_string()))
            .collect();
        Self {
            id: ProjectId::new(),
            name: normalize_name(&name.into()),
            languages,
            buffers,
            created_at_unix: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            languages: self.languages.clone(),
        }
    }

    pub fn buffer(&self, language: SourceLanguage) -> Option<&str> {
        self.buffers.get(&language).map(String::as_str)
    }

    /// Checks the `buffers` / `languages` invariant.  
    /// 檢查 `buffers` 的鍵是否與 `languages` 一致。
    pub fn validate(&self) -> Result<(), ProjectError> {
        if self.languages.is_empty() {
            return Err(ProjectError::MalformedData(
                "a project needs at least one language".into(),
            ));
        }
        let keys: BTreeSet<SourceLanguage> = self.buffers.keys().copied().collect();
        if keys != self.languages {
            return Err(ProjectError::MalformedData(
                "buffers do not match the declared languages".into(),
            ));
        }
        Ok(())
    }

    /// Serialises the record for export.  
    /// 匯出為 JSON 字串。
    pub fn to_serialized(&self) -> Result<String, ProjectError> {
        serde_json::to_string_pretty(self)
            .map_err(|err| ProjectError::MalformedData(err.to_string()))
    }

    /// Parses an exported record; the caller assigns a fresh identity.  
    /// 解析匯入資料；識別碼由呼叫端重新指定。
    pub fn from_serialized(blob: &str) -> Result<Self, ProjectError> {
        let mut value: Value = serde_json::from_str(blob)
            .map_err(|err| ProjectError::MalformedData(format!("not valid JSON: {err}")))?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| ProjectError::MalformedData("expected a JSON object".into()))?;

        match object.get("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => {}
            _ => return Err(ProjectError::MalformedData("missing project id".into())),
        }
        let buffer_keys: Vec<Value> = match object.get("buffers") {
            Some(Value::Object(buffers)) => {
                buffers.keys().map(|key| Value::String(key.clone())).collect()
            }
            _ => return Err(ProjectError::MalformedData("missing buffers".into())),
        };
        if !object.contains_key("languages") {
            object.insert("languages".into(), Value::Array(buffer_keys));
        }

        let mut record: ProjectRecord = serde_json::from_value(value)
            .map_err(|err| ProjectError::MalformedData(err.to_string()))?;
        record.name = normalize_name(&record.name);
        record.validate()?;
        Ok(record)
    }
}

/// Lightweight listing entry.  
/// 專案清單使用的摘要。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
    pub id: ProjectId,
    pub name: String,
    pub languages: BTreeSet<SourceLanguage>,
}

pub(crate) fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        DEFAULT_PROJECT_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_fills_starter_templates() {
        let record = ProjectRecord::new("Demo", [SourceLanguage::Markup, SourceLanguage::Script]);
        assert_eq!(record.languages.len(), 2);
        assert!(record.buffer(SourceLanguage::Markup).unwrap().contains("<h1>"));
        assert!(record.buffer(SourceLanguage::Stylesheet).is_none());
        record.validate().unwrap();
    }

    #[test]
    fn import_derives_languages_from_buffers() {
        let blob = r#"{"id":"x","name":"Old","buffers":{"html":"<p>a</p>","css":"p{}"}}"#;
        let record = ProjectRecord::from_serialized(blob).unwrap();
        assert_eq!(
            record.languages,
            BTreeSet::from([SourceLanguage::Markup, SourceLanguage::Stylesheet])
        );
    }

    #[test]
    fn import_keeps_unknown_fields() {
        let blob = r#"{"id":"x","name":"N","languages":["markup"],"buffers":{"markup":""},"theme":"dark"}"#;
        let record = ProjectRecord::from_serialized(blob).unwrap();
        assert_eq!(record.extra.get("theme"), Some(&Value::String("dark".into())));
        let exported = record.to_serialized().unwrap();
        assert!(exported.contains("\"theme\": \"dark\""));
    }

    #[test]
    fn import_rejects_missing_identity_or_buffers() {
        for blob in [
            r#"{"name":"N","buffers":{"markup":""}}"#,
            r#"{"id":"","buffers":{"markup":""}}"#,
            r#"{"id":"x","name":"N"}"#,
            r#"[1,2]"#,
            "not json",
        ] {
            assert!(matches!(
                ProjectRecord::from_serialized(blob),
                Err(ProjectError::MalformedData(_))
            ));
        }
    }

    #[test]
    fn import_rejects_language_mismatch() {
        let blob = r#"{"id":"x","languages":["markup","script"],"buffers":{"markup":""}}"#;
        assert!(matches!(
            ProjectRecord::from_serialized(blob),
            Err(ProjectError::MalformedData(_))
        ));
    }
}
