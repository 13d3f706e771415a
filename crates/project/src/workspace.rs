use std::time::Duration;

use livepad_core::{
    Clock, PersistenceAdapter, ProjectId, RenderSurface, SaveMode, Session, SessionError,
    SessionOptions, SourceLanguage, SourceRef, SystemClock, TabId, TextWidget,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::record::{ProjectRecord, ProjectSummary};
use crate::store::{Confirmation, ProjectError, ProjectStore};

/// Errors raised while driving the multi-project editor.  
/// 多專案編輯流程的錯誤。
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("no project is open")]
    NoProject,
}

/// Result of a delete request.  
/// 刪除專案後的結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The user declined; nothing changed.
    Declined,
    /// Another project was deleted; the open one stays.
    Deleted,
    /// The open project was deleted and the first remaining one was opened.
    Reopened(ProjectId),
    /// The last project was deleted; a new one must be created.
    CreateNeeded,
}

/// One owner's projects edited through a single auto-saving session.  
/// 以單一自動儲存工作階段編輯某位使用者的專案。
///
/// Each language of the open project gets a tab backed by a project slot, and
/// the markup slot is the document body while a stylesheet or script tab is
/// active. Edits are written through and the preview recomposes at the next
/// `tick`.
pub struct ProjectWorkspace<W> {
    owner: String,
    session: Session<ProjectStore, W>,
    current: Option<ProjectId>,
}

impl<W: TextWidget> ProjectWorkspace<W> {
    /// Opens the owner's first project, if any.  
    /// 開啟使用者的第一個專案（若存在）。
    pub fn start(
        store: ProjectStore,
        owner: impl Into<String>,
        widget: W,
        surface: Box<dyn RenderSurface>,
    ) -> Result<Self, WorkspaceError> {
        Self::with_clock(store, owner, widget, surface, Box::new(SystemClock))
    }

    pub fn with_clock(
        mut store: ProjectStore,
        owner: impl Into<String>,
        widget: W,
        surface: Box<dyn RenderSurface>,
        clock: Box<dyn Clock>,
    ) -> Result<Self, WorkspaceError> {
        let owner = owner.into();
        let first = store.list(&owner)?.into_iter().next();
        let options = SessionOptions {
            save_mode: SaveMode::Auto,
            preview_delay: Duration::ZERO,
        };
        let mut workspace = Self {
            owner,
            session: Session::with_clock(store, widget, surface, options, clock),
            current: None,
        };
        if let Some(summary) = first {
            workspace.open_project(&summary.id)?;
        }
        Ok(workspace)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn session(&self) -> &Session<ProjectStore, W> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<ProjectStore, W> {
        &mut self.session
    }

    pub fn store(&self) -> &ProjectStore {
        self.session.adapter()
    }

    pub fn projects(&mut self) -> Result<Vec<ProjectSummary>, WorkspaceError> {
        let owner = self.owner.clone();
        Ok(self.session.adapter_mut().list(&owner)?)
    }

    pub fn current_project(&self) -> Option<&ProjectRecord> {
        self.current
            .as_ref()
            .and_then(|id| self.session.adapter().get(id))
    }

    /// Tab showing the given slot of the open project.  
    /// 目前專案中指定語言的分頁。
    pub fn tab_for(&self, language: SourceLanguage) -> Option<TabId> {
        let project = self.current.clone()?;
        self.session
            .find_by_source(&SourceRef::slot(project, language))
    }

    /// Replaces the open project's tabs with the given project's slots.  
    /// 以指定專案的語言分頁取代目前的分頁。
    pub fn open_project(&mut self, id: &ProjectId) -> Result<(), WorkspaceError> {
        let languages = {
            let record = self
                .session
                .adapter()
                .get(id)
                .ok_or_else(|| ProjectError::NotFound(id.to_string()))?;
            record.languages.clone()
        };
        self.session.on_widget_changed();
        self.session.adapter_mut().save_pending()?;
        self.session.close_all();
        self.current = Some(id.clone());

        for language in &languages {
            self.session.open(SourceRef::slot(id.clone(), *language))?;
        }
        let markup = self.tab_for(SourceLanguage::Markup);
        self.session.set_canonical_markup(markup);
        if let Some(tab) = markup {
            self.session.activate(tab);
        }
        self.session.run();
        info!(owner = %self.owner, project = %id, "project opened");
        Ok(())
    }

    /// Creates a project and opens it.  
    /// 建立並開啟新專案。
    pub fn create_project(
        &mut self,
        name: &str,
        languages: impl IntoIterator<Item = SourceLanguage>,
    ) -> Result<ProjectId, WorkspaceError> {
        let owner = self.owner.clone();
        let record = self.session.adapter_mut().create(&owner, name, languages)?;
        self.open_project(&record.id)?;
        Ok(record.id)
    }

    /// Deletes a project after confirmation.  
    /// 經確認後刪除專案。
    ///
    /// Deleting the open project falls back to the first remaining one.
    pub fn delete_project(
        &mut self,
        id: &ProjectId,
        confirmation: Confirmation,
    ) -> Result<DeleteOutcome, WorkspaceError> {
        let owner = self.owner.clone();
        if !self
            .session
            .adapter_mut()
            .delete(&owner, id, confirmation)?
        {
            return Ok(DeleteOutcome::Declined);
        }
        if self.current.as_ref() != Some(id) {
            return Ok(DeleteOutcome::Deleted);
        }

        self.session.close_all();
        self.current = None;
        match self.projects()?.into_iter().next() {
            Some(next) => {
                self.open_project(&next.id)?;
                Ok(DeleteOutcome::Reopened(next.id))
            }
            None => {
                debug!(owner = %self.owner, "no projects left");
                Ok(DeleteOutcome::CreateNeeded)
            }
        }
    }

    /// Imports an exported project and opens the copy.  
    /// 匯入專案並開啟。
    pub fn import_project(&mut self, blob: &str) -> Result<ProjectId, WorkspaceError> {
        let owner = self.owner.clone();
        let record = self.session.adapter_mut().import_serialized(&owner, blob)?;
        self.open_project(&record.id)?;
        Ok(record.id)
    }

    /// Exports a project including the latest widget text.  
    /// 匯出專案（含文字元件上最新的內容）。
    pub fn export(&mut self, id: &ProjectId) -> Result<String, WorkspaceError> {
        self.session.on_widget_changed();
        Ok(self.session.adapter().export_serialized(id)?)
    }

    /// Replaces the active slot's content.  
    /// 取代啟用分頁的內容。
    pub fn edit_active(&mut self, content: impl Into<String>) -> Result<(), WorkspaceError> {
        let tab = self.session.active().ok_or(WorkspaceError::NoProject)?;
        self.session.edit(tab, content)?;
        Ok(())
    }

    /// Closes the session and persists pending slot edits.  
    /// 關閉工作階段並寫回未儲存的內容。
    pub fn finish(mut self) -> Result<(ProjectStore, W), WorkspaceError> {
        self.session.on_widget_changed();
        let (mut store, widget) = self.session.into_parts();
        store.flush().map_err(SessionError::from)?;
        Ok((store, widget))
    }
}
