//! Live preview: document composition and isolated render surfaces.
//! 即時預覽：組合文件並輸出到隔離的呈現面。

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

use crate::debounce::DebounceTimer;
use crate::util::write_atomic;

/// 呈現面錯誤。 / Failure while handing a document to a render surface.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write preview {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// 一次預覽輸出。 / One composed document together with its render generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewFrame {
    pub generation: u64,
    pub document: String,
}

/// 接收完整文件並在隔離環境中重新載入。 / Accepts a full document and reloads it in isolation.
///
/// A load replaces the previous document entirely; surfaces keep nothing from
/// earlier frames except the generation they last finished loading.
pub trait RenderSurface {
    fn load(&mut self, frame: PreviewFrame) -> Result<(), RenderError>;

    /// Generation of the last frame that finished loading.
    fn last_loaded(&self) -> Option<u64>;

    /// Document currently displayed.
    fn document(&self) -> Option<&str>;
}

/// 記憶體中的呈現面。 / Surface that keeps only the current document in memory.
#[derive(Debug, Default)]
pub struct MemorySurface {
    current: Option<PreviewFrame>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderSurface for MemorySurface {
    fn load(&mut self, frame: PreviewFrame) -> Result<(), RenderError> {
        self.current = Some(frame);
        Ok(())
    }

    fn last_loaded(&self) -> Option<u64> {
        self.current.as_ref().map(|frame| frame.generation)
    }

    fn document(&self) -> Option<&str> {
        self.current.as_ref().map(|frame| frame.document.as_str())
    }
}

/// 將文件寫入 sandbox iframe 主頁的呈現面。 / Writes a host page that embeds the document in a sandboxed iframe.
///
/// The iframe gets `sandbox="allow-scripts"` without `allow-same-origin`, so the
/// preview runs in an opaque origin with no access to the page that hosts it.
#[derive(Debug)]
pub struct HostPageSurface {
    path: PathBuf,
    current: Option<PreviewFrame>,
    loaded: Option<u64>,
}

impl HostPageSurface {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            current: None,
            loaded: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RenderSurface for HostPageSurface {
    fn load(&mut self, frame: PreviewFrame) -> Result<(), RenderError> {
        let page = host_page(&frame);
        write_atomic(&self.path, page.as_bytes()).map_err(|source| RenderError::Write {
            path: self.path.clone(),
            source,
        })?;
        self.loaded = Some(frame.generation);
        self.current = Some(frame);
        Ok(())
    }

    fn last_loaded(&self) -> Option<u64> {
        self.loaded
    }

    fn document(&self) -> Option<&str> {
        self.current.as_ref().map(|frame| frame.document.as_str())
    }
}

/// 組合預覽文件：樣式、主體、腳本依序排列。 / Composes the preview document in style, body, script order.
pub fn compose<'a>(
    body: &str,
    styles: impl IntoIterator<Item = &'a str>,
    scripts: impl IntoIterator<Item = &'a str>,
) -> String {
    let styles: Vec<&str> = styles.into_iter().collect();
    let scripts: Vec<&str> = scripts.into_iter().collect();

    let mut document = String::with_capacity(
        body.len()
            + styles.iter().map(|s| s.len()).sum::<usize>()
            + scripts.iter().map(|s| s.len()).sum::<usize>()
            + 64,
    );
    if !styles.is_empty() {
        document.push_str("<style>\n");
        for style in &styles {
            document.push_str(style);
            document.push('\n');
        }
        document.push_str("</style>\n");
    }
    document.push_str(body);
    if !scripts.is_empty() {
        if !body.ends_with('\n') {
            document.push('\n');
        }
        document.push_str("<script>\n");
        for script in &scripts {
            document.push_str(script);
            document.push('\n');
        }
        document.push_str("</script>\n");
    }
    document
}

fn host_page(frame: &PreviewFrame) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>LivePad preview</title>\n\
<style>html, body {{ margin: 0; height: 100%; }} iframe {{ border: 0; width: 100%; height: 100%; }}</style>\n\
</head>\n<body>\n<iframe sandbox=\"allow-scripts\" data-generation=\"{}\" srcdoc=\"{}\"></iframe>\n</body>\n</html>\n",
        frame.generation,
        escape_attribute(&frame.document)
    )
}

fn escape_attribute(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// 去抖動的預覽組合器。 / Debounced driver that hands composed documents to a surface.
pub struct PreviewCompositor {
    timer: DebounceTimer,
    surface: Box<dyn RenderSurface>,
    generation: u64,
}

impl PreviewCompositor {
    pub fn new(delay: Duration, surface: Box<dyn RenderSurface>) -> Self {
        Self {
            timer: DebounceTimer::new(delay),
            surface,
            generation: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        self.timer.delay()
    }

    /// 要求重新組合；先前未觸發的請求被取代。 / Requests a recomposition, superseding any pending one.
    pub fn request(&mut self, now: Instant) {
        let pending = self.timer.schedule(now);
        debug!(pending, "preview recomposition scheduled");
    }

    pub fn cancel(&mut self) {
        self.timer.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }

    /// 計時器到期時回傳 `true` 並清除排程。 / Returns `true` once, when the pending request is due.
    pub fn take_due(&mut self, now: Instant) -> bool {
        self.timer.fire_if_due(now).is_some()
    }

    /// 立即輸出文件並回傳世代。 / Hands a document to the surface right away.
    pub fn render(&mut self, document: String) -> Result<u64, RenderError> {
        self.timer.cancel();
        self.generation += 1;
        let generation = self.generation;
        let bytes = document.len();
        self.surface.load(PreviewFrame {
            generation,
            document,
        })?;
        info!(generation, bytes, "preview rendered");
        Ok(generation)
    }

    /// 已輸出的次數。 / Number of documents handed to the surface so far.
    pub fn renders(&self) -> u64 {
        self.generation
    }

    pub fn last_loaded(&self) -> Option<u64> {
        self.surface.last_loaded()
    }

    pub fn surface(&self) -> &dyn RenderSurface {
        self.surface.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn composition_orders_style_body_script() {
        let document = compose("<h1>Hi</h1>", ["h1{color:red}"], ["alert(1)"]);
        let style = document.find("h1{color:red}").unwrap();
        let body = document.find("<h1>Hi</h1>").unwrap();
        let script = document.find("alert(1)").unwrap();
        assert!(style < body && body < script);
        assert!(document.starts_with("<style>"));
    }

    #[test]
    fn composition_without_siblings_is_the_body() {
        let document = compose("<p>x</p>", Vec::<&str>::new(), Vec::<&str>::new());
        assert_eq!(document, "<p>x</p>");
    }

    #[test]
    fn host_page_escapes_document_into_sandboxed_iframe() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("preview.html");
        let mut surface = HostPageSurface::new(&path);
        surface
            .load(PreviewFrame {
                generation: 7,
                document: "<p class=\"a\">&</p>".into(),
            })
            .unwrap();
        let page = fs::read_to_string(&path).unwrap();
        assert!(page.contains("sandbox=\"allow-scripts\""));
        assert!(!page.contains("allow-same-origin"));
        assert!(page.contains("&lt;p class=&quot;a&quot;&gt;&amp;&lt;/p&gt;"));
        assert_eq!(surface.last_loaded(), Some(7));
    }

    #[test]
    fn render_replaces_previous_document() {
        let mut compositor =
            PreviewCompositor::new(Duration::from_millis(10), Box::new(MemorySurface::new()));
        compositor.render("first".into()).unwrap();
        compositor.render("second".into()).unwrap();
        assert_eq!(compositor.surface().document(), Some("second"));
        assert_eq!(compositor.renders(), 2);
        assert_eq!(compositor.last_loaded(), Some(2));
    }
}
