//! The editing session: open tabs, activation, dirty state and preview scheduling.
//! 編輯工作階段：開啟的分頁、啟用狀態、未儲存標記與預覽排程。

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::buffer::BufferModel;
use crate::debounce::{Clock, SystemClock};
use crate::preview::{compose, PreviewCompositor, RenderSurface};
use crate::store::{PersistenceAdapter, StoreError};
use crate::tab::{TabEntry, TabId};
use crate::template::{boilerplate_for, PLACEHOLDER_TEXT};
use crate::widget::{Command, TextWidget};
use crate::{SourceLanguage, SourceRef};

/// Default debounce window for file-backed sessions.
pub const DEFAULT_PREVIEW_DELAY: Duration = Duration::from_millis(1000);

/// 儲存策略。 / How edits reach the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Edits stay in memory until an explicit save.
    #[default]
    Manual,
    /// Every edit is written through to the adapter immediately.
    Auto,
}

/// 工作階段設定。 / Session tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub preview_delay: Duration,
    pub save_mode: SaveMode,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            preview_delay: DEFAULT_PREVIEW_DELAY,
            save_mode: SaveMode::Manual,
        }
    }
}

/// 狀態列訊息。 / Message shown in the status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ready,
    FolderLoaded(String),
    Editing(String),
    Saved(String),
    Error(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ready => f.write_str("Ready"),
            Status::FolderLoaded(name) => write!(f, "Folder loaded: {name}"),
            Status::Editing(name) => write!(f, "Editing: {name}"),
            Status::Saved(name) => write!(f, "{name} saved!"),
            Status::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

/// 工作階段錯誤。 / Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("tab {0} is not open")]
    UnknownTab(TabId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 編輯工作階段：分頁登錄表與預覽驅動。 / Registry of open tabs plus the preview driver.
///
/// All state that a browser playground would keep in globals (open tabs, the
/// active tab, the pending preview timer) lives here and is handed around
/// explicitly. The session is created with [`Session::new`] and torn down with
/// [`Session::into_parts`].
pub struct Session<A, W> {
    adapter: A,
    widget: W,
    clock: Box<dyn Clock>,
    compositor: PreviewCompositor,
    options: SessionOptions,
    tabs: Vec<TabEntry>,
    active: Option<TabId>,
    canonical_markup: Option<TabId>,
    status: Status,
}

impl<A, W> Session<A, W>
where
    A: PersistenceAdapter,
    W: TextWidget,
{
    pub fn new(
        adapter: A,
        widget: W,
        surface: Box<dyn RenderSurface>,
        options: SessionOptions,
    ) -> Self {
        Self::with_clock(adapter, widget, surface, options, Box::new(SystemClock))
    }

    /// 以指定時鐘建立工作階段。 / Creates a session driven by the given clock.
    pub fn with_clock(
        adapter: A,
        mut widget: W,
        surface: Box<dyn RenderSurface>,
        options: SessionOptions,
        clock: Box<dyn Clock>,
    ) -> Self {
        widget.register_command(Command::Save);
        widget.register_command(Command::Run);
        widget.show_placeholder(PLACEHOLDER_TEXT);
        Self {
            adapter,
            widget,
            clock,
            compositor: PreviewCompositor::new(options.preview_delay, surface),
            options,
            tabs: Vec::new(),
            active: None,
            canonical_markup: None,
            status: Status::Ready,
        }
    }

    /// 關閉所有分頁並交回後端與文字元件。 / Closes every tab and hands back the store and widget.
    pub fn into_parts(mut self) -> (A, W) {
        self.close_all();
        (self.adapter, self.widget)
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }

    pub fn widget_mut(&mut self) -> &mut W {
        &mut self.widget
    }

    pub fn compositor(&self) -> &PreviewCompositor {
        &self.compositor
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    /// Tabs in open order.
    pub fn tabs(&self) -> &[TabEntry] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn tab(&self, id: TabId) -> Option<&TabEntry> {
        self.tabs.iter().find(|tab| tab.id() == id)
    }

    pub fn active(&self) -> Option<TabId> {
        self.active
    }

    pub fn active_tab(&self) -> Option<&TabEntry> {
        self.active.and_then(|id| self.tab(id))
    }

    pub fn tab_title(&self, id: TabId) -> Option<String> {
        self.tab(id).map(TabEntry::title)
    }

    /// 找出指向同一邏輯來源的分頁。 / Finds the tab that refers to the same logical source.
    pub fn find_by_source(&self, source: &SourceRef) -> Option<TabId> {
        let key = source.logical_key();
        self.tabs
            .iter()
            .find(|tab| tab.source().logical_key() == key)
            .map(TabEntry::id)
    }

    /// 開啟來源；已開啟時僅啟用既有分頁。 / Opens a source, or activates the tab already showing it.
    pub fn open(&mut self, source: SourceRef) -> Result<TabId, SessionError> {
        if let Some(existing) = self.find_by_source(&source) {
            debug!(tab = %existing, source = %source, "source already open");
            self.activate(existing);
            return Ok(existing);
        }
        let stored = match self.adapter.read(&source) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(source = %source, error = %err, "failed to open source");
                self.status = Status::Error(err.to_string());
                return Err(err.into());
            }
        };
        Ok(self.register(source, stored))
    }

    /// 以空白內容開啟新來源（不讀取後端）。 / Opens a source that does not exist in the store yet.
    pub fn open_new(&mut self, source: SourceRef) -> TabId {
        if let Some(existing) = self.find_by_source(&source) {
            self.activate(existing);
            return existing;
        }
        self.register(source, String::new())
    }

    fn register(&mut self, source: SourceRef, stored: String) -> TabId {
        let language = source.language();
        let content = match boilerplate_for(language) {
            Some(template) if stored.is_empty() => template.to_string(),
            _ => stored.clone(),
        };
        let mut entry = TabEntry::new(source, BufferModel::new(language, content), &stored);
        let id = entry.id();
        if self.options.save_mode == SaveMode::Auto && entry.is_dirty() {
            match self.adapter.write(entry.source(), entry.content()) {
                Ok(()) => entry.mark_persisted(),
                Err(err) => {
                    warn!(source = %entry.source(), error = %err, "failed to store template");
                }
            }
        }
        debug!(tab = %id, source = %entry.source(), "tab opened");
        self.tabs.push(entry);
        self.activate(id);
        id
    }

    /// 設為唯一啟用分頁；未知 id 時不做任何事。 / Makes `id` the sole active tab; unknown ids are ignored.
    pub fn activate(&mut self, id: TabId) {
        let Some(tab) = self.tabs.iter().find(|tab| tab.id() == id) else {
            return;
        };
        let name = tab.display_name();
        let mode = tab.language().editor_mode();
        // Pending widget text belongs to whichever tab is bound before rebinding.
        if self.widget.bound().is_some() {
            self.on_widget_changed();
        }
        if let Some(tab) = self.tabs.iter().find(|tab| tab.id() == id) {
            self.widget.bind(id, mode, tab.content());
        }
        self.active = Some(id);
        self.status = Status::Editing(name);
        self.compositor.request(self.clock.now());
    }

    /// 關閉分頁；回傳是否真的關閉。 / Closes a tab, returning whether it was open.
    pub fn close(&mut self, id: TabId) -> bool {
        let Some(index) = self.tabs.iter().position(|tab| tab.id() == id) else {
            return false;
        };
        if self.widget.bound() == Some(id) {
            self.widget.unbind();
        }
        let closed = self.tabs.remove(index);
        debug!(tab = %id, dirty = closed.is_dirty(), "tab closed");
        drop(closed);

        if self.canonical_markup == Some(id) {
            self.canonical_markup = None;
        }
        if self.active == Some(id) {
            self.active = None;
            match self.tabs.last().map(TabEntry::id) {
                Some(next) => self.activate(next),
                None => {
                    self.compositor.cancel();
                    self.widget.show_placeholder(PLACEHOLDER_TEXT);
                    self.status = Status::Ready;
                }
            }
        }
        true
    }

    pub fn close_all(&mut self) {
        while let Some(id) = self.tabs.last().map(TabEntry::id) {
            self.close(id);
        }
    }

    /// 更新內容並排程預覽。 / Replaces a tab's content and schedules a preview refresh.
    pub fn edit(&mut self, id: TabId, content: impl Into<String>) -> Result<(), SessionError> {
        let content = content.into();
        if self.widget.bound() == Some(id) {
            self.widget.set_value(&content);
        }
        self.apply_edit(id, content)
    }

    /// 文字元件內容變更通知（無內容）。 / Change notification from the widget; the value is re-read.
    pub fn on_widget_changed(&mut self) {
        let Some(id) = self.widget.bound() else {
            return;
        };
        let value = self.widget.value();
        if let Err(err) = self.apply_edit(id, value) {
            debug!(error = %err, "widget change ignored");
        }
    }

    fn apply_edit(&mut self, id: TabId, content: String) -> Result<(), SessionError> {
        let auto = self.options.save_mode == SaveMode::Auto;
        let tab = self
            .tabs
            .iter_mut()
            .find(|tab| tab.id() == id)
            .ok_or(SessionError::UnknownTab(id))?;
        if !tab.apply_edit(content) {
            return Ok(());
        }
        let mut failure = None;
        if auto {
            match self.adapter.write(tab.source(), tab.content()) {
                Ok(()) => tab.mark_persisted(),
                Err(err) => {
                    warn!(source = %tab.source(), error = %err, "write-through failed");
                    failure = Some(err.to_string());
                }
            }
        }
        if let Some(message) = failure {
            self.status = Status::Error(message);
        }
        self.compositor.request(self.clock.now());
        Ok(())
    }

    /// 寫入後端並清除未儲存標記。 / Writes the tab to its store and clears the dirty flag.
    pub fn save(&mut self, id: TabId) -> Result<(), SessionError> {
        if self.widget.bound() == Some(id) {
            self.on_widget_changed();
        }
        let tab = self
            .tabs
            .iter_mut()
            .find(|tab| tab.id() == id)
            .ok_or(SessionError::UnknownTab(id))?;
        let name = tab.display_name();
        let written = self
            .adapter
            .write(tab.source(), tab.content())
            .and_then(|()| self.adapter.flush());
        match written {
            Ok(()) => {
                tab.mark_persisted();
                info!(tab = %id, name = %name, "saved");
                self.status = Status::Saved(name);
                self.recompose();
                Ok(())
            }
            Err(err) => {
                warn!(tab = %id, name = %name, error = %err, "save failed");
                self.status = Status::Error(format!("could not save {name}: {err}"));
                Err(err.into())
            }
        }
    }

    /// 儲存啟用中的分頁；沒有時不做事。 / Saves the active tab, if any.
    pub fn save_active(&mut self) -> Result<(), SessionError> {
        match self.active {
            Some(id) => self.save(id),
            None => Ok(()),
        }
    }

    /// 略過去抖動立即重新組合。 / Recomposes right away, bypassing the debounce window.
    pub fn run(&mut self) {
        self.on_widget_changed();
        self.recompose();
    }

    /// 執行文字元件上的指令。 / Dispatches a command registered on the widget.
    pub fn execute(&mut self, command: Command) -> Result<(), SessionError> {
        match command {
            Command::Save => self.save_active(),
            Command::Run => {
                self.run();
                Ok(())
            }
        }
    }

    /// 事件迴圈呼叫；計時器到期時重新組合並回傳 `true`。 / Event-loop pump; recomposes when the timer is due.
    pub fn tick(&mut self) -> bool {
        if !self.compositor.take_due(self.clock.now()) {
            return false;
        }
        if self.options.save_mode == SaveMode::Auto {
            if let Err(err) = self.adapter.flush() {
                warn!(error = %err, "flush failed");
                self.status = Status::Error(err.to_string());
            }
        }
        self.recompose();
        true
    }

    /// 指定非 HTML 分頁啟用時使用的 HTML 分頁。 / Markup tab composed when a non-markup tab is active.
    pub fn set_canonical_markup(&mut self, id: Option<TabId>) -> bool {
        match id {
            None => {
                self.canonical_markup = None;
                true
            }
            Some(id) => match self.tab(id) {
                Some(tab) if tab.language() == SourceLanguage::Markup => {
                    self.canonical_markup = Some(id);
                    true
                }
                _ => false,
            },
        }
    }

    pub fn canonical_markup(&self) -> Option<TabId> {
        self.canonical_markup
    }

    /// 依目前內容組合文件；沒有可用的 HTML 時回傳 `None`。 / Composes the current document, if a markup body exists.
    pub fn composed_document(&self) -> Option<String> {
        let active = self.active_tab()?;
        let body = if active.language() == SourceLanguage::Markup {
            active
        } else {
            self.canonical_markup.and_then(|id| self.tab(id))?
        };
        let styles = self
            .tabs
            .iter()
            .filter(|tab| tab.language() == SourceLanguage::Stylesheet)
            .map(TabEntry::content);
        let scripts = self
            .tabs
            .iter()
            .filter(|tab| tab.language() == SourceLanguage::Script)
            .map(TabEntry::content);
        Some(compose(body.content(), styles, scripts))
    }

    fn recompose(&mut self) {
        let Some(document) = self.composed_document() else {
            self.compositor.cancel();
            debug!("no markup to preview");
            return;
        };
        if let Err(err) = self.compositor.render(document) {
            warn!(error = %err, "preview surface rejected the document");
            self.status = Status::Error(err.to_string());
        }
    }
}

impl<A, W> fmt::Debug for Session<A, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("tabs", &self.tabs)
            .field("active", &self.active)
            .field("canonical_markup", &self.canonical_markup)
            .field("status", &self.status)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debounce::ManualClock;
    use crate::preview::MemorySurface;
    use crate::store::KeyValueStore;
    use crate::widget::HeadlessWidget;

    fn session(clock: &ManualClock) -> Session<KeyValueStore, HeadlessWidget> {
        Session::with_clock(
            KeyValueStore::in_memory(),
            HeadlessWidget::new(),
            Box::new(MemorySurface::new()),
            SessionOptions::default(),
            Box::new(clock.clone()),
        )
    }

    #[test]
    fn new_session_registers_commands_and_placeholder() {
        let clock = ManualClock::new();
        let session = session(&clock);
        assert!(session.widget().has_command(Command::Save));
        assert!(session.widget().has_command(Command::Run));
        assert_eq!(session.widget().placeholder(), Some(PLACEHOLDER_TEXT));
        assert_eq!(session.status(), &Status::Ready);
    }

    #[test]
    fn empty_markup_source_receives_boilerplate() {
        let clock = ManualClock::new();
        let mut session = session(&clock);
        let id = session.open_new(SourceRef::storage("me", "index.html"));
        let tab = session.tab(id).unwrap();
        assert!(tab.content().contains("<!DOCTYPE html>"));
        assert!(tab.is_dirty());
        assert_eq!(session.widget().mode(), "html");
    }

    #[test]
    fn empty_stylesheet_stays_empty() {
        let clock = ManualClock::new();
        let mut session = session(&clock);
        let id = session.open_new(SourceRef::storage("me", "main.css"));
        assert_eq!(session.tab(id).unwrap().content(), "");
        assert!(!session.tab(id).unwrap().is_dirty());
    }

    #[test]
    fn edit_of_unknown_tab_is_an_error() {
        let clock = ManualClock::new();
        let mut session = session(&clock);
        let id = session.open_new(SourceRef::storage("me", "a.txt"));
        session.close(id);
        assert!(matches!(
            session.edit(id, "x"),
            Err(SessionError::UnknownTab(_))
        ));
    }

    #[test]
    fn run_bypasses_debounce() {
        let clock = ManualClock::new();
        let mut session = session(&clock);
        let id = session.open_new(SourceRef::storage("me", "page.html"));
        session.edit(id, "<p>now</p>").unwrap();
        session.run();
        assert_eq!(session.compositor().surface().document(), Some("<p>now</p>"));
        assert!(!session.compositor().is_pending());
    }

    #[test]
    fn status_line_texts() {
        assert_eq!(Status::Saved("a.css".into()).to_string(), "a.css saved!");
        assert_eq!(Status::Editing("a.css".into()).to_string(), "Editing: a.css");
    }
}
