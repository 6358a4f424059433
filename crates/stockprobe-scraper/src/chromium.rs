//! [`PageSession`] over a headless Chromium tab via the DevTools protocol.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use stockprobe_core::AppConfig;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::session::{PageSession, SessionError, SessionLauncher};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// True when the element has a layout box and is not hidden by CSS.
const IS_VISIBLE_JS: &str = "function() { \
    const style = window.getComputedStyle(this); \
    const rect = this.getBoundingClientRect(); \
    return style.display !== 'none' && style.visibility !== 'hidden' \
        && rect.width > 0 && rect.height > 0; }";

/// Launches one [`ChromiumSession`] per pipeline run.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
    chrome_path: Option<PathBuf>,
}

impl ChromiumLauncher {
    #[must_use]
    pub fn new(headless: bool, chrome_path: Option<PathBuf>) -> Self {
        Self {
            headless,
            chrome_path,
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.browser_headless, config.chrome_path.clone())
    }
}

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn launch(&self) -> Result<ChromiumSession, SessionError> {
        ChromiumSession::launch(self.headless, self.chrome_path.as_deref()).await
    }
}

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromiumSession {
    /// Starts Chromium and opens a blank tab.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Launch`] if the browser cannot be started or
    /// the tab cannot be opened.
    pub async fn launch(headless: bool, chrome_path: Option<&Path>) -> Result<Self, SessionError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox");
        if !headless {
            builder = builder.with_head();
        }
        if let Some(path) = chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(SessionError::Launch)?;

        let (browser, mut events) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(err) = event {
                    tracing::debug!(error = %err, "browser event loop error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                handler.abort();
                return Err(SessionError::Launch(err.to_string()));
            }
        };
        tracing::info!(headless, "browser session opened");

        Ok(Self {
            browser,
            page,
            handler,
        })
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Maps a CDP failure onto the session taxonomy by its message.
fn session_error(err: CdpError) -> SessionError {
    let message = err.to_string();
    if message.contains("Node is detached")
        || message.contains("Could not find node")
        || message.contains("No node with given id")
    {
        SessionError::StaleNode(message)
    } else {
        SessionError::Protocol(message)
    }
}

fn navigation_error(url: &str, err: CdpError) -> SessionError {
    match session_error(err) {
        SessionError::Protocol(message) if message.contains("net::ERR_") => {
            SessionError::Navigation {
                url: url.to_string(),
                message,
            }
        }
        SessionError::Protocol(message) => {
            SessionError::Protocol(format!("navigating to {url}: {message}"))
        }
        other => other,
    }
}

async fn is_visible(element: &Element) -> Result<bool, SessionError> {
    let returns = element
        .call_js_fn(IS_VISIBLE_JS, false)
        .await
        .map_err(session_error)?;
    Ok(returns
        .result
        .value
        .as_ref()
        .and_then(|v| v.as_bool())
        .unwrap_or(false))
}

#[async_trait]
impl PageSession for ChromiumSession {
    type Node = Element;

    async fn goto(&mut self, url: &str) -> Result<(), SessionError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| navigation_error(url, e))?;
        Ok(())
    }

    async fn query_selector(&mut self, selector: &str) -> Result<Option<Element>, SessionError> {
        Ok(self.query_all(selector).await?.into_iter().next())
    }

    async fn query_all(&mut self, selector: &str) -> Result<Vec<Element>, SessionError> {
        self.page
            .find_elements(selector)
            .await
            .map_err(session_error)
    }

    async fn read_text(&mut self, node: &Element) -> Result<String, SessionError> {
        Ok(node
            .inner_text()
            .await
            .map_err(session_error)?
            .unwrap_or_default())
    }

    async fn read_attribute(
        &mut self,
        node: &Element,
        name: &str,
    ) -> Result<Option<String>, SessionError> {
        node.attribute(name).await.map_err(session_error)
    }

    async fn click(&mut self, node: &Element) -> Result<(), SessionError> {
        // DOM click, so overlapping sticky headers cannot swallow it.
        node.call_js_fn("function() { this.click(); }", false)
            .await
            .map_err(session_error)?;
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Element, SessionError> {
        let deadline = Instant::now() + timeout;
        loop {
            for node in self.query_all(selector).await? {
                if is_visible(&node).await? {
                    return Ok(node);
                }
            }
            if Instant::now() >= deadline {
                return Err(SessionError::Timeout {
                    selector: selector.to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn content(&mut self) -> Result<String, SessionError> {
        self.page.content().await.map_err(session_error)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.browser.close().await.map_err(session_error)?;
        self.browser
            .wait()
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        self.handler.abort();
        tracing::info!("browser session closed");
        Ok(())
    }
}
