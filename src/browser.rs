//! Browser-engine control used by browser-driven sources.
//!
//! A [`BrowserEngine`] launches one instance per worker. The instance is a [`BrowserSession`]
//! that navigates and hands out [`BrowserElement`] handles bound to the current page.

use crate::error::HarvestError;
use chromiumoxide::{error::CdpError, Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[async_trait::async_trait]
pub trait BrowserEngine: Send + Sync + 'static {
    type Session: BrowserSession + 'static;

    async fn launch(&self) -> Result<Self::Session, HarvestError>;
    async fn shutdown(&self, session: Self::Session);
}

#[async_trait::async_trait]
pub trait BrowserSession: Send {
    type Element: BrowserElement + 'static;

    async fn navigate(&mut self, url: &str) -> Result<(), HarvestError>;

    /// Fails with `HarvestError::ElementNotFound` once `timeout` elapses.
    async fn wait_for_element(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), HarvestError>;

    async fn find_all(&mut self, selector: &str) -> Result<Vec<Self::Element>, HarvestError>;
}

#[async_trait::async_trait]
pub trait BrowserElement: Send + Sync + Sized {
    async fn find_one(&self, selector: &str) -> Result<Option<Self>, HarvestError>;
    async fn text(&self) -> Result<Option<String>, HarvestError>;
    async fn attribute(&self, name: &str) -> Result<Option<String>, HarvestError>;

    /// `name` attribute of the closest ancestor matching `selector`.
    async fn ancestor_attribute(
        &self,
        selector: &str,
        name: &str,
    ) -> Result<Option<String>, HarvestError>;
}

fn browser_error(e: impl std::fmt::Display) -> HarvestError {
    HarvestError::Browser(e.to_string())
}

pub struct ChromiumEngine {
    user_agent: String,
    headless: bool,
}

impl ChromiumEngine {
    pub fn new(user_agent: impl Into<String>, headless: bool) -> Self {
        ChromiumEngine {
            user_agent: user_agent.into(),
            headless,
        }
    }
}

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

#[async_trait::async_trait]
impl BrowserEngine for ChromiumEngine {
    type Session = ChromiumSession;

    async fn launch(&self) -> Result<ChromiumSession, HarvestError> {
        let mut builder = BrowserConfig::builder()
            .arg(format!("--user-agent={}", self.user_agent))
            .arg("--disable-blink-features=AutomationControlled");
        if !self.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(HarvestError::BrowserUnavailable)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| HarvestError::BrowserUnavailable(e.to_string()))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| HarvestError::BrowserUnavailable(e.to_string()))?;
        debug!("Browser engine launched");

        Ok(ChromiumSession {
            browser,
            page,
            handler,
        })
    }

    async fn shutdown(&self, session: ChromiumSession) {
        let ChromiumSession {
            mut browser,
            page,
            handler,
        } = session;
        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", e);
        }
        if let Err(e) = browser.close().await {
            warn!("Failed to close browser engine: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("Browser engine did not exit cleanly: {}", e);
        }
        handler.abort();
        debug!("Browser engine released");
    }
}

/// `None` while nothing matches yet. A failing query is a broken page, not an absent element.
fn poll_outcome<T>(found: Result<Vec<T>, CdpError>) -> Option<Result<(), HarvestError>> {
    match found {
        Ok(found) if !found.is_empty() => Some(Ok(())),
        Ok(_) | Err(CdpError::NotFound) => None,
        Err(e) => Some(Err(browser_error(e))),
    }
}

#[async_trait::async_trait]
impl BrowserSession for ChromiumSession {
    type Element = Element;

    async fn navigate(&mut self, url: &str) -> Result<(), HarvestError> {
        debug!("Navigate {}", url);
        self.page.goto(url).await.map_err(browser_error)?;
        Ok(())
    }

    async fn wait_for_element(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), HarvestError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(done) = poll_outcome(self.page.find_elements(selector).await) {
                return done;
            }
            if Instant::now() >= deadline {
                return Err(HarvestError::ElementNotFound(selector.to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn find_all(&mut self, selector: &str) -> Result<Vec<Element>, HarvestError> {
        self.page.find_elements(selector).await.map_err(browser_error)
    }
}

#[async_trait::async_trait]
impl BrowserElement for Element {
    async fn find_one(&self, selector: &str) -> Result<Option<Self>, HarvestError> {
        let mut found = self.find_elements(selector).await.map_err(browser_error)?;
        if found.is_empty() {
            Ok(None)
        } else {
            Ok(Some(found.swap_remove(0)))
        }
    }

    async fn text(&self) -> Result<Option<String>, HarvestError> {
        self.inner_text().await.map_err(browser_error)
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, HarvestError> {
        Element::attribute(self, name).await.map_err(browser_error)
    }

    async fn ancestor_attribute(
        &self,
        selector: &str,
        name: &str,
    ) -> Result<Option<String>, HarvestError> {
        let function = format!(
            "function() {{ const p = this.parentElement; const a = p && p.closest({}); return a ? a.getAttribute({}) : null; }}",
            serde_json::to_string(selector).map_err(browser_error)?,
            serde_json::to_string(name).map_err(browser_error)?,
        );
        let returns = self.call_js_fn(function, false).await.map_err(browser_error)?;
        Ok(returns
            .result
            .value
            .and_then(|v| v.as_str().map(ToString::to_string)))
    }
}
