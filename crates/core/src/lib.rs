//! Editing-session core for the LivePad playground: buffers, tabs, persistence
//! adapters and the debounced live preview.
//! LivePad 編輯工作階段核心：緩衝區、分頁、持久化介面與去抖動即時預覽。

pub mod buffer;
pub mod debounce;
pub mod language;
pub mod preview;
pub mod session;
pub mod source;
pub mod store;
pub mod tab;
pub mod template;
pub mod util;
pub mod widget;

pub use buffer::{BufferModel, ContentHash};
pub use debounce::{Clock, DebounceTimer, ManualClock, SystemClock};
pub use language::{CompositionRole, SourceLanguage};
pub use preview::{
    compose, HostPageSurface, MemorySurface, PreviewCompositor, PreviewFrame, RenderError,
    RenderSurface,
};
pub use session::{
    SaveMode, Session, SessionError, SessionOptions, Status, DEFAULT_PREVIEW_DELAY,
};
pub use source::{ProjectId, SourceRef};
pub use store::{FileStore, KeyValueStore, PersistenceAdapter, StoreError};
pub use tab::{TabEntry, TabId};
pub use template::{boilerplate_for, starter_template, MARKUP_BOILERPLATE, PLACEHOLDER_TEXT};
pub use util::{owner_token, write_atomic};
pub use widget::{Command, HeadlessWidget, TextWidget};
