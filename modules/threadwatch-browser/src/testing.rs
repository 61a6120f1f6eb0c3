// Scripted in-memory browser for pipeline tests.
//
// Pages are registered per URL. Each page serves element markup per selector
// as a list of frames: frame N is what is visible after N scrolls (the last
// frame repeats). Navigation failures, slow navigations, slow context
// open/close, navigation panics, broken elements and delayed chat replies can
// be scripted. Every context open/close and every
// navigation is recorded for assertions.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use scraper::Html;

use crate::error::{BrowserError, Result};
use crate::{BrowserSession, ContextId, ElementHandle};

// ---------------------------------------------------------------------------
// MockPage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MockPage {
    elements: HashMap<String, Vec<Vec<String>>>,
    text: String,
    redirect_to: Option<String>,
    inputs: HashMap<String, Option<String>>,
    clickable: HashMap<String, Option<String>>,
    reply: Option<ScriptedReply>,
}

#[derive(Debug, Clone)]
struct ScriptedReply {
    after_polls: usize,
    selector: String,
    html: String,
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same elements at every scroll depth.
    pub fn with_elements(self, selector: &str, html: Vec<String>) -> Self {
        self.with_frames(selector, vec![html])
    }

    /// Elements visible after 0, 1, 2, ... scrolls.
    pub fn with_frames(mut self, selector: &str, frames: Vec<Vec<String>>) -> Self {
        self.elements.insert(selector.to_string(), frames);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Navigation to this page lands on another URL (e.g. a login wall).
    pub fn redirecting_to(mut self, url: &str) -> Self {
        self.redirect_to = Some(url.to_string());
        self
    }

    pub fn with_input(mut self, selector: &str) -> Self {
        self.inputs.insert(selector.to_string(), None);
        self
    }

    /// Pressing Enter in `selector` moves the context to `target`.
    pub fn with_submitting_input(mut self, selector: &str, target: &str) -> Self {
        self.inputs
            .insert(selector.to_string(), Some(target.to_string()));
        self
    }

    /// Clicking `selector` succeeds and optionally moves the context to `target`.
    pub fn with_clickable(mut self, selector: &str, target: Option<&str>) -> Self {
        self.clickable
            .insert(selector.to_string(), target.map(String::from));
        self
    }

    /// After a submit, the `after_polls`-th `page_text` call (and later ones)
    /// shows `html` as a new element matching `selector`.
    pub fn with_reply(mut self, after_polls: usize, selector: &str, html: &str) -> Self {
        self.reply = Some(ScriptedReply {
            after_polls,
            selector: selector.to_string(),
            html: html.to_string(),
        });
        self
    }
}

// ---------------------------------------------------------------------------
// MockSession
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ContextState {
    url: String,
    scrolls: usize,
    submitted: bool,
    polls: usize,
}

#[derive(Debug, Default)]
struct SessionState {
    contexts: HashMap<ContextId, ContextState>,
    next_id: u64,
    opened: Vec<ContextId>,
    closed: Vec<ContextId>,
    navigations: Vec<String>,
    nav_failures: HashMap<String, usize>,
    filled: Vec<(String, String)>,
    clicks: Vec<String>,
    shut_down: bool,
}

pub struct MockSession {
    pages: HashMap<String, MockPage>,
    slow: HashMap<String, Duration>,
    slow_open: Option<Duration>,
    slow_close: Option<Duration>,
    slow_text: Option<Duration>,
    panics: HashSet<String>,
    broken: HashSet<String>,
    refuse_contexts: bool,
    state: Mutex<SessionState>,
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSession {
    pub fn new() -> Self {
        let mut state = SessionState {
            next_id: 1,
            ..SessionState::default()
        };
        state
            .contexts
            .insert(ContextId::PRIMARY, ContextState::default());
        Self {
            pages: HashMap::new(),
            slow: HashMap::new(),
            slow_open: None,
            slow_close: None,
            slow_text: None,
            panics: HashSet::new(),
            broken: HashSet::new(),
            refuse_contexts: false,
            state: Mutex::new(state),
        }
    }

    pub fn on_page(mut self, url: &str, page: MockPage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// The next `times` navigations to `url` fail (`usize::MAX` for always).
    pub fn fail_navigation(self, url: &str, times: usize) -> Self {
        self.lock().nav_failures.insert(url.to_string(), times);
        self
    }

    /// Navigation to `url` sleeps for `delay` before succeeding.
    pub fn slow_navigation(mut self, url: &str, delay: Duration) -> Self {
        self.slow.insert(url.to_string(), delay);
        self
    }

    /// Opening and closing contexts each sleep for `delay`.
    pub fn slow_contexts(mut self, delay: Duration) -> Self {
        self.slow_open = Some(delay);
        self.slow_close = Some(delay);
        self
    }

    /// Closing a context sleeps for `delay` before it is recorded.
    pub fn slow_close(mut self, delay: Duration) -> Self {
        self.slow_close = Some(delay);
        self
    }

    /// Every `page_text` call sleeps for `delay` first.
    pub fn slow_page_text(mut self, delay: Duration) -> Self {
        self.slow_text = Some(delay);
        self
    }

    /// Navigating to `url` panics.
    pub fn panic_on_navigation(mut self, url: &str) -> Self {
        self.panics.insert(url.to_string());
        self
    }

    /// Reading the markup of an element whose markup is exactly `html` fails.
    pub fn broken_element(mut self, html: &str) -> Self {
        self.broken.insert(html.to_string());
        self
    }

    pub fn refusing_contexts(mut self) -> Self {
        self.refuse_contexts = true;
        self
    }

    pub fn opened_contexts(&self) -> Vec<ContextId> {
        self.lock().opened.clone()
    }

    pub fn closed_contexts(&self) -> Vec<ContextId> {
        self.lock().closed.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    pub fn filled(&self) -> Vec<(String, String)> {
        self.lock().filled.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.lock().clicks.clone()
    }

    pub fn scrolls(&self, context: ContextId) -> usize {
        self.lock()
            .contexts
            .get(&context)
            .map(|c| c.scrolls)
            .unwrap_or(0)
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_context<T>(
        &self,
        context: ContextId,
        f: impl FnOnce(&mut ContextState, Option<&MockPage>) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.lock();
        if state.shut_down {
            return Err(BrowserError::Driver("session shut down".into()));
        }
        let ctx = state
            .contexts
            .get_mut(&context)
            .ok_or(BrowserError::UnknownContext(context))?;
        let page = self.pages.get(&ctx.url);
        f(ctx, page)
    }

    fn visible(ctx: &ContextState, page: &MockPage, selector: &str) -> Vec<String> {
        let mut out = page
            .elements
            .get(selector)
            .and_then(|frames| {
                frames
                    .get(ctx.scrolls)
                    .or_else(|| frames.last())
                    .cloned()
            })
            .unwrap_or_default();
        if let Some(ref reply) = page.reply {
            if ctx.submitted && ctx.polls >= reply.after_polls && reply.selector == selector {
                out.push(reply.html.clone());
            }
        }
        out
    }

    fn markup(&self, element: &ElementHandle) -> Result<String> {
        self.with_context(element.context, |ctx, page| {
            let page = page.ok_or_else(|| BrowserError::Query("blank page".into()))?;
            Self::visible(ctx, page, &element.selector)
                .get(element.index)
                .cloned()
                .ok_or_else(|| BrowserError::Query(format!("{} [{}] gone", element.selector, element.index)))
        })
    }
}

fn text_of(html: &str) -> String {
    Html::parse_fragment(html)
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_string()
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn navigate(&self, context: ContextId, url: &str, timeout: Duration) -> Result<()> {
        if self.panics.contains(url) {
            panic!("scripted panic navigating to {url}");
        }
        {
            let mut state = self.lock();
            state.navigations.push(url.to_string());
            if let Some(remaining) = state.nav_failures.get_mut(url) {
                if *remaining > 0 {
                    if *remaining != usize::MAX {
                        *remaining -= 1;
                    }
                    return Err(BrowserError::Navigation {
                        url: url.to_string(),
                        message: "scripted failure".into(),
                    });
                }
            }
        }

        if let Some(delay) = self.slow.get(url) {
            if *delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(BrowserError::Timeout {
                    url: url.to_string(),
                    secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(*delay).await;
        }

        let landed = self
            .pages
            .get(url)
            .and_then(|p| p.redirect_to.clone())
            .unwrap_or_else(|| url.to_string());
        self.with_context(context, |ctx, _| {
            *ctx = ContextState {
                url: landed,
                ..ContextState::default()
            };
            Ok(())
        })
    }

    async fn new_isolated_context(&self) -> Result<ContextId> {
        if self.refuse_contexts {
            return Err(BrowserError::Driver("scripted context refusal".into()));
        }
        if let Some(delay) = self.slow_open {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        let id = ContextId(state.next_id);
        state.next_id += 1;
        state.contexts.insert(id, ContextState::default());
        state.opened.push(id);
        Ok(id)
    }

    async fn close_context(&self, context: ContextId) -> Result<()> {
        if let Some(delay) = self.slow_close {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        state
            .contexts
            .remove(&context)
            .ok_or(BrowserError::UnknownContext(context))?;
        state.closed.push(context);
        Ok(())
    }

    async fn query_all(&self, context: ContextId, selector: &str) -> Result<Vec<ElementHandle>> {
        let count = self.with_context(context, |ctx, page| {
            Ok(page.map(|p| Self::visible(ctx, p, selector).len()).unwrap_or(0))
        })?;
        Ok((0..count)
            .map(|index| ElementHandle {
                context,
                selector: selector.to_string(),
                index,
            })
            .collect())
    }

    async fn element_html(&self, element: &ElementHandle) -> Result<String> {
        let html = self.markup(element)?;
        if self.broken.contains(&html) {
            return Err(BrowserError::Query("scripted broken element".into()));
        }
        Ok(html)
    }

    async fn element_text(&self, element: &ElementHandle) -> Result<String> {
        Ok(text_of(&self.markup(element)?))
    }

    async fn element_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>> {
        let html = self.markup(element)?;
        let doc = Html::parse_fragment(&html);
        Ok(doc
            .root_element()
            .children()
            .filter_map(scraper::ElementRef::wrap)
            .next()
            .and_then(|el| el.value().attr(name).map(String::from)))
    }

    async fn scroll_by_viewport(&self, context: ContextId) -> Result<()> {
        self.with_context(context, |ctx, _| {
            ctx.scrolls += 1;
            Ok(())
        })
    }

    async fn current_url(&self, context: ContextId) -> Result<String> {
        self.with_context(context, |ctx, _| Ok(ctx.url.clone()))
    }

    async fn page_text(&self, context: ContextId) -> Result<String> {
        if let Some(delay) = self.slow_text {
            tokio::time::sleep(delay).await;
        }
        self.with_context(context, |ctx, page| {
            let Some(page) = page else {
                return Ok(String::new());
            };
            if ctx.submitted {
                ctx.polls += 1;
            }
            let mut text = page.text.clone();
            if let Some(ref reply) = page.reply {
                if ctx.submitted && ctx.polls >= reply.after_polls {
                    text.push('\n');
                    text.push_str(&text_of(&reply.html));
                }
            }
            Ok(text)
        })
    }

    async fn fill(&self, context: ContextId, selector: &str, text: &str) -> Result<bool> {
        let found = self.with_context(context, |_, page| {
            Ok(page.is_some_and(|p| p.inputs.contains_key(selector)))
        })?;
        if found {
            self.lock()
                .filled
                .push((selector.to_string(), text.to_string()));
        }
        Ok(found)
    }

    async fn press_enter(&self, context: ContextId, selector: &str) -> Result<()> {
        self.with_context(context, |ctx, page| {
            let Some(target) = page.and_then(|p| p.inputs.get(selector)) else {
                return Err(BrowserError::Query(format!("no element for {selector}")));
            };
            match target {
                Some(url) => {
                    *ctx = ContextState {
                        url: url.clone(),
                        ..ContextState::default()
                    };
                }
                None => {
                    ctx.submitted = true;
                    ctx.polls = 0;
                }
            }
            Ok(())
        })
    }

    async fn click(&self, context: ContextId, selector: &str) -> Result<bool> {
        let target = self.with_context(context, |_, page| {
            Ok(page.and_then(|p| p.clickable.get(selector).cloned()))
        })?;
        let Some(target) = target else {
            return Ok(false);
        };
        self.lock().clicks.push(selector.to_string());
        if let Some(url) = target {
            self.with_context(context, |ctx, _| {
                *ctx = ContextState {
                    url,
                    ..ContextState::default()
                };
                Ok(())
            })?;
        }
        Ok(true)
    }

    async fn shutdown(&self) -> Result<()> {
        self.lock().shut_down = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEL: &str = "article";

    fn session() -> MockSession {
        MockSession::new().on_page(
            "https://site/feed",
            MockPage::new().with_frames(
                SEL,
                vec![
                    vec!["<article>one</article>".into()],
                    vec!["<article>one</article>".into(), "<article>two</article>".into()],
                ],
            ),
        )
    }

    #[tokio::test]
    async fn frames_advance_with_scrolls() {
        let s = session();
        let ctx = ContextId::PRIMARY;
        s.navigate(ctx, "https://site/feed", Duration::from_secs(1)).await.unwrap();
        assert_eq!(s.query_all(ctx, SEL).await.unwrap().len(), 1);
        s.scroll_by_viewport(ctx).await.unwrap();
        s.scroll_by_viewport(ctx).await.unwrap();
        let els = s.query_all(ctx, SEL).await.unwrap();
        assert_eq!(els.len(), 2);
        assert_eq!(s.element_text(&els[1]).await.unwrap(), "two");
    }

    #[tokio::test]
    async fn scripted_navigation_failure_is_consumed() {
        let s = session().fail_navigation("https://site/feed", 1);
        let ctx = ContextId::PRIMARY;
        assert!(s.navigate(ctx, "https://site/feed", Duration::from_secs(1)).await.is_err());
        assert!(s.navigate(ctx, "https://site/feed", Duration::from_secs(1)).await.is_ok());
        assert_eq!(s.navigations().len(), 2);
    }

    #[tokio::test]
    async fn contexts_are_tracked() {
        let s = session();
        let ctx = s.new_isolated_context().await.unwrap();
        s.close_context(ctx).await.unwrap();
        assert_eq!(s.opened_contexts(), vec![ctx]);
        assert_eq!(s.closed_contexts(), vec![ctx]);
        assert!(s.close_context(ctx).await.is_err());
    }
}
