//! The browser seam: one tab, driven sequentially.
//!
//! The pipeline never talks to a browser directly. It drives a
//! [`PageSession`], which the Chromium adapter implements for real runs and
//! [`crate::testing::FixtureSession`] implements for tests.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("stale DOM node: {0}")]
    StaleNode(String),

    #[error("timed out after {timeout_ms} ms waiting for {selector}")]
    Timeout { selector: String, timeout_ms: u64 },

    #[error("browser protocol error: {0}")]
    Protocol(String),

    #[error("failed to launch browser: {0}")]
    Launch(String),
}

impl SessionError {
    /// Failures expected to clear up on a plain retry with the same inputs.
    ///
    /// A protocol-level navigation error or a node detached by a re-render
    /// qualifies. Timeouts and other protocol errors do not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionError::Navigation { .. } | SessionError::StaleNode(_)
        )
    }
}

/// A single browser tab reused across sequential operations.
///
/// Node handles are only valid until the next navigation.
#[async_trait]
pub trait PageSession: Send {
    type Node: Send + Sync;

    /// Navigates and returns once the DOM is ready. Subresources may still load.
    async fn goto(&mut self, url: &str) -> Result<(), SessionError>;

    /// First element matching `selector`, or `None` when nothing matches.
    async fn query_selector(&mut self, selector: &str) -> Result<Option<Self::Node>, SessionError>;

    async fn query_all(&mut self, selector: &str) -> Result<Vec<Self::Node>, SessionError>;

    async fn read_text(&mut self, node: &Self::Node) -> Result<String, SessionError>;

    async fn read_attribute(
        &mut self,
        node: &Self::Node,
        name: &str,
    ) -> Result<Option<String>, SessionError>;

    async fn click(&mut self, node: &Self::Node) -> Result<(), SessionError>;

    /// Waits up to `timeout` for `selector` to match a rendered, visible element.
    ///
    /// Elements that are in the DOM but hidden do not count.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Timeout`] if nothing matched in time.
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Self::Node, SessionError>;

    /// The rendered document as HTML.
    async fn content(&mut self) -> Result<String, SessionError>;

    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Opens a fresh [`PageSession`] per pipeline run.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    type Session: PageSession + 'static;

    async fn launch(&self) -> Result<Self::Session, SessionError>;
}

/// Navigates to `url`, waits `settle` for late rendering, and returns the markup.
pub(crate) async fn load_html<S: PageSession>(
    session: &mut S,
    url: &str,
    settle: Duration,
) -> Result<String, SessionError> {
    session.goto(url).await?;
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }
    session.content().await
}
