use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::SourceLanguage;

/// 內容的 64 位元雜湊，用以判斷是否與已儲存版本不同。 / 64-bit content fingerprint used for dirty tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(u64);

impl ContentHash {
    pub fn of(text: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// 緩衝區的權威內容與語言。 / Authoritative in-memory text of one source plus its language.
///
/// A `BufferModel` is owned by exactly one tab; it is never cloned into a second
/// writable copy.
#[derive(Debug)]
pub struct BufferModel {
    language: SourceLanguage,
    content: String,
}

impl BufferModel {
    pub fn new(language: SourceLanguage, content: impl Into<String>) -> Self {
        Self {
            language,
            content: content.into(),
        }
    }

    pub fn language(&self) -> SourceLanguage {
        self.language
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// 以新內容取代；內容未變時回傳 `false`。 / Replaces the content, returning `false` when nothing changed.
    pub fn replace(&mut self, content: impl Into<String>) -> bool {
        let content = content.into();
        if content == self.content {
            return false;
        }
        self.content = content;
        true
    }

    pub fn hash(&self) -> ContentHash {
        ContentHash::of(&self.content)
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_reports_changes_only() {
        let mut buffer = BufferModel::new(SourceLanguage::Plain, "abc");
        assert!(!buffer.replace("abc"));
        assert!(buffer.replace("abcd"));
        assert_eq!(buffer.content(), "abcd");
        assert_eq!(buffer.hash(), ContentHash::of("abcd"));
    }
}
