use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// 緩衝區的來源語言。 / Source language of a buffer; selects syntax rules and composition role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceLanguage {
    #[serde(alias = "html", alias = "htm")]
    Markup,
    #[serde(alias = "css")]
    Stylesheet,
    #[serde(alias = "js", alias = "javascript")]
    Script,
    #[serde(alias = "json")]
    Data,
    #[serde(alias = "php")]
    ServerScript,
    #[serde(alias = "ts", alias = "typescript")]
    ScriptSecondary,
    #[serde(alias = "text", alias = "plaintext")]
    Plain,
}

/// 在組合文件中扮演的角色。 / Role a buffer plays inside the composed preview document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionRole {
    Style,
    Body,
    Script,
}

impl SourceLanguage {
    pub const ALL: [SourceLanguage; 7] = [
        SourceLanguage::Markup,
        SourceLanguage::Stylesheet,
        SourceLanguage::Script,
        SourceLanguage::Data,
        SourceLanguage::ServerScript,
        SourceLanguage::ScriptSecondary,
        SourceLanguage::Plain,
    ];

    /// 依副檔名推斷語言。 / Infers the language from a file extension (case-insensitive).
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("html") | Some("htm") => SourceLanguage::Markup,
            Some("css") => SourceLanguage::Stylesheet,
            Some("js") | Some("mjs") => SourceLanguage::Script,
            Some("json") => SourceLanguage::Data,
            Some("php") => SourceLanguage::ServerScript,
            Some("ts") => SourceLanguage::ScriptSecondary,
            _ => SourceLanguage::Plain,
        }
    }

    /// 文字元件使用的語言代號。 / Language id handed to the text widget for syntax rules.
    pub fn editor_mode(self) -> &'static str {
        match self {
            SourceLanguage::Markup => "html",
            SourceLanguage::Stylesheet => "css",
            SourceLanguage::Script => "javascript",
            SourceLanguage::Data => "json",
            SourceLanguage::ServerScript => "php",
            SourceLanguage::ScriptSecondary => "typescript",
            SourceLanguage::Plain => "plaintext",
        }
    }

    /// 在預覽組合中的角色；不參與組合者回傳 `None`。 / Composition role, `None` for languages the preview ignores.
    pub fn composition_role(self) -> Option<CompositionRole> {
        match self {
            SourceLanguage::Markup => Some(CompositionRole::Body),
            SourceLanguage::Stylesheet => Some(CompositionRole::Style),
            SourceLanguage::Script => Some(CompositionRole::Script),
            SourceLanguage::Data
            | SourceLanguage::ServerScript
            | SourceLanguage::ScriptSecondary
            | SourceLanguage::Plain => None,
        }
    }

    /// Display name of the project slot holding this language.
    pub fn slot_file_name(self) -> &'static str {
        match self {
            SourceLanguage::Markup => "index.html",
            SourceLanguage::Stylesheet => "style.css",
            SourceLanguage::Script => "script.js",
            SourceLanguage::Data => "data.json",
            SourceLanguage::ServerScript => "index.php",
            SourceLanguage::ScriptSecondary => "script.ts",
            SourceLanguage::Plain => "notes.txt",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceLanguage::Markup => "markup",
            SourceLanguage::Stylesheet => "stylesheet",
            SourceLanguage::Script => "script",
            SourceLanguage::Data => "data",
            SourceLanguage::ServerScript => "server-script",
            SourceLanguage::ScriptSecondary => "script-secondary",
            SourceLanguage::Plain => "plain",
        }
    }

    /// 解析語言名稱，接受常見副檔名別名。 / Parses a language name, accepting common extension aliases.
    pub fn parse(value: &str) -> Option<Self> {
        let lowered = value.trim().to_ascii_lowercase();
        let found = match lowered.as_str() {
            "markup" | "html" | "htm" => SourceLanguage::Markup,
            "stylesheet" | "css" => SourceLanguage::Stylesheet,
            "script" | "js" | "javascript" => SourceLanguage::Script,
            "data" | "json" => SourceLanguage::Data,
            "server-script" | "php" => SourceLanguage::ServerScript,
            "script-secondary" | "ts" | "typescript" => SourceLanguage::ScriptSecondary,
            "plain" | "text" | "plaintext" => SourceLanguage::Plain,
            _ => return None,
        };
        Some(found)
    }
}

impl fmt::Display for SourceLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
