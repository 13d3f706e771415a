use std::collections::BTreeSet;

use crate::TabId;

/// 文字元件上註冊的指令。 / Commands the session registers on the text widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Command {
    /// Ctrl/Cmd+S.
    Save,
    /// Manual preview refresh.
    Run,
}

/// 外部文字編輯元件的介面。 / Capability surface of the external text widget.
///
/// The widget shows exactly one buffer at a time. `bind` swaps the bound tab in
/// one step, and change notifications carry no payload: the session asks the
/// widget which tab is bound and what its value is.
pub trait TextWidget {
    /// Binds a buffer, replacing whatever was bound before.
    fn bind(&mut self, tab: TabId, mode: &str, text: &str);

    /// Unbinds the current buffer and returns its id.
    fn unbind(&mut self) -> Option<TabId>;

    fn bound(&self) -> Option<TabId>;

    fn value(&self) -> String;

    /// Replaces the text of the bound buffer without rebinding.
    fn set_value(&mut self, text: &str);

    fn show_placeholder(&mut self, text: &str);

    fn register_command(&mut self, command: Command);
}

/// 無畫面的文字元件，供 CLI 與測試使用。 / In-memory widget used by the CLI and tests.
#[derive(Debug, Default)]
pub struct HeadlessWidget {
    bound: Option<TabId>,
    mode: String,
    text: String,
    placeholder: Option<String>,
    commands: BTreeSet<Command>,
}

impl HeadlessWidget {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模擬使用者輸入；回傳是否有綁定的緩衝區。 / Simulates typing; returns whether a buffer was bound.
    pub fn type_text(&mut self, text: &str) -> bool {
        if self.bound.is_none() {
            return false;
        }
        self.text = text.to_string();
        true
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn placeholder(&self) -> Option<&str> {
        self.placeholder.as_deref()
    }

    pub fn has_command(&self, command: Command) -> bool {
        self.commands.contains(&command)
    }
}

impl TextWidget for HeadlessWidget {
    fn bind(&mut self, tab: TabId, mode: &str, text: &str) {
        self.bound = Some(tab);
        self.mode = mode.to_string();
        self.text = text.to_string();
        self.placeholder = None;
    }

    fn unbind(&mut self) -> Option<TabId> {
        self.text.clear();
        self.bound.take()
    }

    fn bound(&self) -> Option<TabId> {
        self.bound
    }

    fn value(&self) -> String {
        self.text.clone()
    }

    fn set_value(&mut self, text: &str) {
        if self.bound.is_some() {
            self.text = text.to_string();
        }
    }

    fn show_placeholder(&mut self, text: &str) {
        self.bound = None;
        self.text.clear();
        self.placeholder = Some(text.to_string());
    }

    fn register_command(&mut self, command: Command) {
        self.commands.insert(command);
    }
}
