// Chromium session over the DevTools protocol.
//
// One browser process with a persistent profile (keeps the login), one page
// per context. Element handles are resolved by re-querying their selector.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{BrowserError, Result};
use crate::{BrowserSession, ContextId, ElementHandle};

const SCROLL_SCRIPT: &str = "window.scrollBy(0, window.innerHeight);";
const PAGE_TEXT_SCRIPT: &str = "document.body ? document.body.innerText : ''";

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub executable: Option<PathBuf>,
    pub profile_dir: PathBuf,
    pub headless: bool,
}

pub struct ChromeSession {
    browser: tokio::sync::Mutex<Option<Browser>>,
    handler: JoinHandle<()>,
    pages: Mutex<HashMap<ContextId, Page>>,
    next_id: AtomicU64,
}

impl ChromeSession {
    /// Launch Chromium and open the primary context.
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(&options.profile_dir)
            .args(vec![
                "--no-first-run",
                "--no-default-browser-check",
                "--disable-session-crashed-bubble",
                "--disable-blink-features=AutomationControlled",
            ]);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(ref exe) = options.executable {
            builder = builder.chrome_executable(exe);
        }
        let config = builder.build().map_err(BrowserError::Driver)?;

        let (browser, mut events) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler event error");
                }
            }
        });

        let primary = browser.new_page("about:blank").await?;
        info!(
            headless = options.headless,
            profile = %options.profile_dir.display(),
            "Chromium session started"
        );

        let mut pages = HashMap::new();
        pages.insert(ContextId::PRIMARY, primary);

        Ok(Self {
            browser: tokio::sync::Mutex::new(Some(browser)),
            handler,
            pages: Mutex::new(pages),
            next_id: AtomicU64::new(1),
        })
    }

    fn page(&self, context: ContextId) -> Result<Page> {
        self.pages
            .lock()
            .map_err(|_| BrowserError::Driver("page table poisoned".into()))?
            .get(&context)
            .cloned()
            .ok_or(BrowserError::UnknownContext(context))
    }

    async fn resolve(&self, element: &ElementHandle) -> Result<Element> {
        let page = self.page(element.context)?;
        let mut found = page
            .find_elements(element.selector.as_str())
            .await
            .map_err(|e| BrowserError::Query(e.to_string()))?;
        if element.index >= found.len() {
            return Err(BrowserError::Query(format!(
                "{} [{}] no longer present ({} matches)",
                element.selector,
                element.index,
                found.len()
            )));
        }
        Ok(found.swap_remove(element.index))
    }

    async fn first(&self, context: ContextId, selector: &str) -> Result<Option<Element>> {
        let page = self.page(context)?;
        match page.find_element(selector).await {
            Ok(el) => Ok(Some(el)),
            Err(e) => {
                debug!(selector, error = %e, "No element for selector");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, context: ContextId, url: &str, timeout: Duration) -> Result<()> {
        let page = self.page(context)?;
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(BrowserError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(BrowserError::Timeout {
                url: url.to_string(),
                secs: timeout.as_secs(),
            }),
        }
    }

    async fn new_isolated_context(&self) -> Result<ContextId> {
        let page = {
            let browser = self.browser.lock().await;
            let browser = browser
                .as_ref()
                .ok_or_else(|| BrowserError::Driver("browser already shut down".into()))?;
            browser.new_page("about:blank").await?
        };
        let id = ContextId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pages
            .lock()
            .map_err(|_| BrowserError::Driver("page table poisoned".into()))?
            .insert(id, page);
        debug!(%id, "Opened context");
        Ok(id)
    }

    async fn close_context(&self, context: ContextId) -> Result<()> {
        let page = self
            .pages
            .lock()
            .map_err(|_| BrowserError::Driver("page table poisoned".into()))?
            .remove(&context)
            .ok_or(BrowserError::UnknownContext(context))?;
        page.close().await?;
        debug!(%context, "Closed context");
        Ok(())
    }

    async fn query_all(&self, context: ContextId, selector: &str) -> Result<Vec<ElementHandle>> {
        let page = self.page(context)?;
        let found = page
            .find_elements(selector)
            .await
            .map_err(|e| BrowserError::Query(e.to_string()))?;
        Ok((0..found.len())
            .map(|index| ElementHandle {
                context,
                selector: selector.to_string(),
                index,
            })
            .collect())
    }

    async fn element_html(&self, element: &ElementHandle) -> Result<String> {
        let el = self.resolve(element).await?;
        Ok(el.outer_html().await?.unwrap_or_default())
    }

    async fn element_text(&self, element: &ElementHandle) -> Result<String> {
        let el = self.resolve(element).await?;
        Ok(el.inner_text().await?.unwrap_or_default())
    }

    async fn element_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>> {
        let el = self.resolve(element).await?;
        Ok(el.attribute(name).await?)
    }

    async fn scroll_by_viewport(&self, context: ContextId) -> Result<()> {
        let page = self.page(context)?;
        page.evaluate(SCROLL_SCRIPT).await?;
        Ok(())
    }

    async fn current_url(&self, context: ContextId) -> Result<String> {
        let page = self.page(context)?;
        Ok(page.url().await?.unwrap_or_default())
    }

    async fn page_text(&self, context: ContextId) -> Result<String> {
        let page = self.page(context)?;
        Ok(page.evaluate(PAGE_TEXT_SCRIPT).await?.into_value::<String>()?)
    }

    async fn fill(&self, context: ContextId, selector: &str, text: &str) -> Result<bool> {
        let page = self.page(context)?;
        // Rich inputs are contenteditable divs; plain inputs take `.value`.
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.focus(); if ('value' in el) {{ el.value = {text}; }} else {{ el.innerText = {text}; }} \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); return true; }})()",
            sel = serde_json::to_string(selector)?,
            text = serde_json::to_string(text)?,
        );
        Ok(page.evaluate(script).await?.into_value::<bool>()?)
    }

    async fn press_enter(&self, context: ContextId, selector: &str) -> Result<()> {
        let el = self
            .first(context, selector)
            .await?
            .ok_or_else(|| BrowserError::Query(format!("no element for {selector}")))?;
        el.press_key("Enter").await?;
        Ok(())
    }

    async fn click(&self, context: ContextId, selector: &str) -> Result<bool> {
        let Some(el) = self.first(context, selector).await? else {
            return Ok(false);
        };
        el.scroll_into_view().await?;
        el.click().await?;
        Ok(true)
    }

    async fn shutdown(&self) -> Result<()> {
        let pages: Vec<Page> = self
            .pages
            .lock()
            .map_err(|_| BrowserError::Driver("page table poisoned".into()))?
            .drain()
            .map(|(_, p)| p)
            .collect();
        for page in pages {
            if let Err(e) = page.close().await {
                debug!(error = %e, "Page close during shutdown failed");
            }
        }

        let mut guard = self.browser.lock().await;
        if let Some(mut browser) = guard.take() {
            if let Err(e) = browser.close().await {
                warn!(error = %e, "Browser close failed");
            }
            if let Err(e) = browser.wait().await {
                warn!(error = %e, "Browser process wait failed");
            }
        }
        self.handler.abort();
        info!("Chromium session closed");
        Ok(())
    }
}
