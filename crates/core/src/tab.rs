use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::buffer::{BufferModel, ContentHash};
use crate::{SourceLanguage, SourceRef};

static NEXT_TAB_ID: AtomicU64 = AtomicU64::new(1);

/// 分頁識別碼，在行程內單調遞增。 / Tab identifier; monotonic within the process, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TabId(u64);

impl TabId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TAB_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

/// 工作階段中一個開啟的緩衝區。 / One open buffer in the session.
#[derive(Debug)]
pub struct TabEntry {
    id: TabId,
    source: SourceRef,
    buffer: BufferModel,
    persisted: ContentHash,
    is_dirty: bool,
}

impl TabEntry {
    /// `content` is what the store holds; `buffer` may differ when a template was applied.
    pub(crate) fn new(source: SourceRef, buffer: BufferModel, stored: &str) -> Self {
        let persisted = ContentHash::of(stored);
        let is_dirty = buffer.hash() != persisted;
        Self {
            id: TabId::next(),
            source,
            buffer,
            persisted,
            is_dirty,
        }
    }

    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    pub fn buffer(&self) -> &BufferModel {
        &self.buffer
    }

    pub fn language(&self) -> SourceLanguage {
        self.buffer.language()
    }

    pub fn content(&self) -> &str {
        self.buffer.content()
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn display_name(&self) -> String {
        self.source.display_name()
    }

    /// 分頁標題，未儲存時加上圓點。 / Tab title with a dot marker while unsaved.
    pub fn title(&self) -> String {
        let name = self.display_name();
        if self.is_dirty {
            format!("{name} ●")
        } else {
            name
        }
    }

    pub(crate) fn apply_edit(&mut self, content: impl Into<String>) -> bool {
        let changed = self.buffer.replace(content);
        if changed {
            self.is_dirty = self.buffer.hash() != self.persisted;
        }
        changed
    }

    /// 記錄後端已確認寫入目前內容。 / Records that the store confirmed the current content.
    pub(crate) fn mark_persisted(&mut self) {
        self.persisted = self.buffer.hash();
        self.is_dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(stored: &str) -> TabEntry {
        TabEntry::new(
            SourceRef::file("notes.txt"),
            BufferModel::new(SourceLanguage::Plain, stored),
            stored,
        )
    }

    #[test]
    fn ids_are_unique() {
        let a = entry("");
        let b = entry("");
        assert_ne!(a.id(), b.id());
        assert!(b.id() > a.id());
    }

    #[test]
    fn reverting_an_edit_clears_dirty() {
        let mut tab = entry("v1");
        assert!(!tab.is_dirty());
        tab.apply_edit("v2");
        assert!(tab.is_dirty());
        assert_eq!(tab.title(), "notes.txt ●");
        tab.apply_edit("v1");
        assert!(!tab.is_dirty());
    }

    #[test]
    fn template_content_starts_dirty() {
        let tab = TabEntry::new(
            SourceRef::file("index.html"),
            BufferModel::new(SourceLanguage::Markup, "<html></html>"),
            "",
        );
        assert!(tab.is_dirty());
    }
}
