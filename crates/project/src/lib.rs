//! Multi-project storage and editing flow for LivePad.
//! 管理 LivePad 多專案儲存與編輯流程的模組。

mod util;

pub mod record;
pub mod store;
pub mod workspace;

pub use record::{ProjectRecord, ProjectSummary};
pub use store::{Confirmation, ProjectError, ProjectStore, PROJECT_LIST_VERSION};
pub use workspace::{DeleteOutcome, ProjectWorkspace, WorkspaceError};
