//! Browser session boundary.
//!
//! Everything the pipelines need from a browser goes through `BrowserSession`:
//! navigation, element queries, scrolling, and a few input primitives. Every
//! call is fallible; callers decide per call site whether a failure skips an
//! item or ends a loop.

pub mod chrome;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use chrome::{ChromeSession, LaunchOptions};
pub use error::{BrowserError, Result};

use std::time::Duration;

use async_trait::async_trait;

/// One browsing context (a tab). `ContextId(0)` is the primary context that
/// lives for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl ContextId {
    pub const PRIMARY: ContextId = ContextId(0);
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// The `index`-th element matching `selector` in `context` at query time.
/// Handles are positional; a re-render may point them at a different node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub context: ContextId,
    pub selector: String,
    pub index: usize,
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Load `url` in `context`, failing if it takes longer than `timeout`.
    async fn navigate(&self, context: ContextId, url: &str, timeout: Duration) -> Result<()>;

    /// Open a fresh context that shares the session's login state.
    async fn new_isolated_context(&self) -> Result<ContextId>;

    async fn close_context(&self, context: ContextId) -> Result<()>;

    /// All elements currently matching `selector`, in document order.
    async fn query_all(&self, context: ContextId, selector: &str) -> Result<Vec<ElementHandle>>;

    /// Serialized markup of the element, including the element itself.
    async fn element_html(&self, element: &ElementHandle) -> Result<String>;

    /// Rendered (visible) text of the element.
    async fn element_text(&self, element: &ElementHandle) -> Result<String>;

    async fn element_attribute(&self, element: &ElementHandle, name: &str)
        -> Result<Option<String>>;

    async fn scroll_by_viewport(&self, context: ContextId) -> Result<()>;

    async fn current_url(&self, context: ContextId) -> Result<String>;

    /// Rendered text of the whole page.
    async fn page_text(&self, context: ContextId) -> Result<String>;

    /// Put `text` into the first element matching `selector`.
    /// Returns `false` when nothing matches.
    async fn fill(&self, context: ContextId, selector: &str, text: &str) -> Result<bool>;

    /// Press Enter on the first element matching `selector`.
    async fn press_enter(&self, context: ContextId, selector: &str) -> Result<()>;

    /// Click the first element matching `selector`. Returns `false` when nothing matches.
    async fn click(&self, context: ContextId, selector: &str) -> Result<bool>;

    /// Tear down the browser. Later calls fail.
    async fn shutdown(&self) -> Result<()>;
}
