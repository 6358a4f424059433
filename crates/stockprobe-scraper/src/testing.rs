//! Scripted in-memory [`PageSession`] and markup builders for tests.
//!
//! Pages are keyed by the absolute URL the pipeline navigates to. Queries run
//! against the page's markup with the `scraper` crate, so the same selectors
//! the built-in registry ships are exercised end to end.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use stockprobe_core::{AppConfig, Environment};

use crate::session::{PageSession, SessionError, SessionLauncher};

pub const FIXTURE_ORIGIN: &str = "https://shop.test";

/// An [`AppConfig`] pointed at [`FIXTURE_ORIGIN`] with default timings.
#[must_use]
pub fn fixture_config() -> AppConfig {
    AppConfig {
        env: Environment::Test,
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        log_level: "debug".to_string(),
        base_url: FIXTURE_ORIGIN.to_string(),
        seed_path: "/".to_string(),
        selectors_path: None,
        snapshot_dir: std::env::temp_dir().join("stockprobe-fixture"),
        crawl_max_depth: 2,
        category_limit: 5,
        retry_budget: 3,
        selector_retry_delay_ms: 2000,
        page_settle_delay_ms: 500,
        probe_delay_ms: 1000,
        overlay_timeout_ms: 5000,
        max_stage_attempts: 3,
        browser_headless: true,
        chrome_path: None,
    }
}

/// `FIXTURE_ORIGIN` joined with `path`.
#[must_use]
pub fn fixture_url(path: &str) -> String {
    format!("{FIXTURE_ORIGIN}/{}", path.trim_start_matches('/'))
}

/// Failure injected into a navigation or click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureFailure {
    Http2Protocol,
    DetachedNode,
    Protocol,
}

impl FixtureFailure {
    fn to_error(self, url: &str) -> SessionError {
        match self {
            FixtureFailure::Http2Protocol => SessionError::Navigation {
                url: url.to_string(),
                message: "net::ERR_HTTP2_PROTOCOL_ERROR".to_string(),
            },
            FixtureFailure::DetachedNode => {
                SessionError::StaleNode("Node is detached from document".to_string())
            }
            FixtureFailure::Protocol => SessionError::Protocol("Target closed".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixturePage {
    /// Served by visit number; the last body repeats.
    bodies: Vec<String>,
    /// Failure for visit `i`, consumed before any body is served.
    goto_failures: Vec<FixtureFailure>,
    /// Outcome for click `i` on this page; `None` lets the click through.
    click_failures: Vec<Option<FixtureFailure>>,
    /// `(trigger selector, fragment)` appended to the body on a matching click.
    reveal: Option<(String, String)>,
}

impl FixturePage {
    #[must_use]
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            bodies: vec![body.into()],
            ..Self::default()
        }
    }

    /// Markup served from the next visit on.
    #[must_use]
    pub fn then_html(mut self, body: impl Into<String>) -> Self {
        self.bodies.push(body.into());
        self
    }

    /// Fails one more visit; scripted failures hit the first visits in order.
    #[must_use]
    pub fn fail_goto(mut self, failure: FixtureFailure) -> Self {
        self.goto_failures.push(failure);
        self
    }

    /// Fails one more click; scripted failures hit the first clicks in order.
    #[must_use]
    pub fn fail_click(mut self, failure: FixtureFailure) -> Self {
        self.click_failures.push(Some(failure));
        self
    }

    /// Lets one more click through, so a later `fail_click` lands after it.
    #[must_use]
    pub fn pass_click(mut self) -> Self {
        self.click_failures.push(None);
        self
    }

    #[must_use]
    pub fn reveal_on_click(mut self, trigger: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.reveal = Some((trigger.into(), fragment.into()));
        self
    }

    fn body_for_visit(&self, visit: usize) -> &str {
        self.bodies
            .get(visit)
            .or(self.bodies.last())
            .map_or("", String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixtureSite {
    pages: HashMap<String, FixturePage>,
}

impl FixtureSite {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `page` under `FIXTURE_ORIGIN` + `path`.
    #[must_use]
    pub fn with_page(mut self, path: &str, page: FixturePage) -> Self {
        self.pages.insert(fixture_url(path), page);
        self
    }

    /// Registers `page` under an exact URL.
    #[must_use]
    pub fn with_page_at(mut self, url: impl Into<String>, page: FixturePage) -> Self {
        self.pages.insert(url.into(), page);
        self
    }
}

#[derive(Debug, Clone)]
pub struct FixtureNode {
    html: String,
    text: String,
    attrs: HashMap<String, String>,
}

#[derive(Debug)]
pub struct FixtureSession {
    site: FixtureSite,
    current: Option<String>,
    dom: String,
    visits: HashMap<String, usize>,
    clicks: HashMap<String, usize>,
    history: Vec<String>,
    fail_close: bool,
    closed: bool,
}

impl FixtureSession {
    #[must_use]
    pub fn new(site: FixtureSite) -> Self {
        Self {
            site,
            current: None,
            dom: String::new(),
            visits: HashMap::new(),
            clicks: HashMap::new(),
            history: Vec::new(),
            fail_close: false,
            closed: false,
        }
    }

    #[must_use]
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Navigations to `url`, failed ones included.
    #[must_use]
    pub fn visits(&self, url: &str) -> usize {
        self.visits.get(url).copied().unwrap_or(0)
    }

    /// Every URL navigated to, in order.
    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.history
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

fn parse_selector(selector: &str) -> Result<Selector, SessionError> {
    Selector::parse(selector)
        .map_err(|e| SessionError::Protocol(format!("invalid selector {selector}: {e}")))
}

fn select_nodes(dom: &str, selector: &str) -> Result<Vec<FixtureNode>, SessionError> {
    let parsed = parse_selector(selector)?;
    let doc = Html::parse_document(dom);
    Ok(doc
        .select(&parsed)
        .map(|el| FixtureNode {
            html: el.html(),
            text: el.text().collect(),
            attrs: el
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
        .collect())
}

/// Nodes carrying a `hidden` attribute or an inline `display: none` are in
/// the DOM but not rendered.
fn is_rendered(node: &FixtureNode) -> bool {
    if node.attrs.contains_key("hidden") {
        return false;
    }
    let style: String = node
        .attrs
        .get("style")
        .map(|s| s.chars().filter(|c| !c.is_whitespace()).collect())
        .unwrap_or_default();
    !style.contains("display:none")
}

fn node_matches(node: &FixtureNode, selector: &str) -> Result<bool, SessionError> {
    let parsed = parse_selector(selector)?;
    let fragment = Html::parse_fragment(&node.html);
    let matched = fragment.select(&parsed).next().is_some();
    Ok(matched)
}

fn bump(counter: &mut HashMap<String, usize>, key: &str) -> usize {
    let slot = counter.entry(key.to_string()).or_insert(0);
    let seen = *slot;
    *slot += 1;
    seen
}

#[async_trait]
impl PageSession for FixtureSession {
    type Node = FixtureNode;

    async fn goto(&mut self, url: &str) -> Result<(), SessionError> {
        self.history.push(url.to_string());
        let visit = bump(&mut self.visits, url);
        self.current = None;
        self.dom.clear();

        let Some(page) = self.site.pages.get(url) else {
            return Err(SessionError::Protocol(format!("no fixture page for {url}")));
        };
        if let Some(failure) = page.goto_failures.get(visit) {
            return Err(failure.to_error(url));
        }
        let body = page.body_for_visit(visit).to_string();
        self.dom = body;
        self.current = Some(url.to_string());
        Ok(())
    }

    async fn query_selector(&mut self, selector: &str) -> Result<Option<FixtureNode>, SessionError> {
        Ok(select_nodes(&self.dom, selector)?.into_iter().next())
    }

    async fn query_all(&mut self, selector: &str) -> Result<Vec<FixtureNode>, SessionError> {
        select_nodes(&self.dom, selector)
    }

    async fn read_text(&mut self, node: &FixtureNode) -> Result<String, SessionError> {
        Ok(node.text.clone())
    }

    async fn read_attribute(
        &mut self,
        node: &FixtureNode,
        name: &str,
    ) -> Result<Option<String>, SessionError> {
        Ok(node.attrs.get(name).cloned())
    }

    async fn click(&mut self, node: &FixtureNode) -> Result<(), SessionError> {
        let Some(url) = self.current.clone() else {
            return Err(SessionError::Protocol("click with no page loaded".to_string()));
        };
        let click = bump(&mut self.clicks, &url);
        let Some(page) = self.site.pages.get(&url) else {
            return Ok(());
        };
        if let Some(failure) = page.click_failures.get(click).copied().flatten() {
            return Err(failure.to_error(&url));
        }
        if let Some((trigger, fragment)) = page.reveal.clone() {
            if node_matches(node, &trigger)? {
                match self.dom.rfind("</body>") {
                    Some(pos) => self.dom.insert_str(pos, &fragment),
                    None => self.dom.push_str(&fragment),
                }
            }
        }
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<FixtureNode, SessionError> {
        select_nodes(&self.dom, selector)?
            .into_iter()
            .find(is_rendered)
            .ok_or_else(|| SessionError::Timeout {
                selector: selector.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })
    }

    async fn content(&mut self) -> Result<String, SessionError> {
        Ok(self.dom.clone())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.fail_close {
            return Err(SessionError::Protocol("browser process already exited".to_string()));
        }
        self.closed = true;
        Ok(())
    }
}

/// Hands out a fresh [`FixtureSession`] over a copy of the site per launch.
#[derive(Debug, Clone, Default)]
pub struct FixtureLauncher {
    site: FixtureSite,
    fail_launch: bool,
}

impl FixtureLauncher {
    #[must_use]
    pub fn new(site: FixtureSite) -> Self {
        Self {
            site,
            fail_launch: false,
        }
    }

    /// A launcher whose browser never starts.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            site: FixtureSite::new(),
            fail_launch: true,
        }
    }
}

#[async_trait]
impl SessionLauncher for FixtureLauncher {
    type Session = FixtureSession;

    async fn launch(&self) -> Result<FixtureSession, SessionError> {
        if self.fail_launch {
            return Err(SessionError::Launch("chrome executable not found".to_string()));
        }
        Ok(FixtureSession::new(self.site.clone()))
    }
}

// ---------------------------------------------------------------------------
// Markup builders matching the built-in selector table
// ---------------------------------------------------------------------------

fn anchors(links: &[(&str, &str)], wrap_li: bool) -> String {
    let mut out = String::new();
    for (name, href) in links {
        if wrap_li {
            let _ = write!(out, r#"<li><a href="{href}">{name}</a></li>"#);
        } else {
            let _ = write!(out, r#"<a href="{href}">{name}</a>"#);
        }
    }
    out
}

/// Landing page with top-level navigation links `(name, href)`.
#[must_use]
pub fn landing_page(links: &[(&str, &str)]) -> String {
    format!(
        r#"<html><body><div class="sc-e8cbc69d-0 dKMQVj">{}</div></body></html>"#,
        anchors(links, false)
    )
}

/// Nested category page with sidebar links `(name, href)`.
#[must_use]
pub fn category_page(links: &[(&str, &str)]) -> String {
    format!(
        r#"<html><body><ul class="sc-1656bbdd-0 gQqszz">{}</ul></body></html>"#,
        anchors(links, true)
    )
}

/// A page none of the category or listing selectors match.
#[must_use]
pub fn blank_page() -> String {
    "<html><body><main><p>Something went wrong</p></main></body></html>".to_string()
}

/// One product card. `url` of `None` leaves out the product link.
#[must_use]
pub fn product_card(name: &str, brand: &str, price: &str, url: Option<&str>) -> String {
    let link = url.map_or_else(String::new, |href| {
        format!(r#"<a class="sc-b0fdbb10-0 iNiATr" href="{href}"><img src="https://img.test/p.jpg"></a>"#)
    });
    format!(
        r#"<article>{link}<p><strong>{brand}</strong> <span class="sc-6923aaa7-0 fkBRnq">{name}</span></p><span class="sc-812f8453-1 fMoCQC">{price}</span><p class="sc-ce74e31a-9 gcbXXJ">128 GB, Black</p><a class="sc-ccd25b80-0 beNCEW sc-430e9524-6 gSfbKC" href="/fr/s1/producttype/smartphone-24">Smartphones</a></article>"#
    )
}

/// Listing page with `cards` inside the product grid.
#[must_use]
pub fn listing_page(cards: &[String]) -> String {
    format!(
        r#"<html><body><div class="sc-5d2f6f43-1 jwLEDS">{}</div></body></html>"#,
        cards.concat()
    )
}

const TRIGGER: &str = "button.sc-58bde996-0.bQTVcy";

/// Product detail page whose availability widget reveals `stock_line` and
/// `locations` pickup entries when clicked.
#[must_use]
pub fn product_page(stock_line: &str, locations: usize) -> FixturePage {
    let pickup: String = (0..locations)
        .map(|i| format!("<li><strong>Store {i}</strong></li>"))
        .collect();
    let overlay = format!(
        r#"<div class="sc-d0d34be1-2 dMCIvG"><div class="sc-dbd9c505-1 fwiPKQ">{stock_line}</div><ul>{pickup}</ul><button class="sc-2f97377a-0 iDwhgK sc-d0d34be1-3 fgYBWv">Close</button></div>"#
    );
    FixturePage::html(
        r#"<html><body><h1>Product</h1><button class="sc-58bde996-0 bQTVcy">Check availability</button></body></html>"#,
    )
    .reveal_on_click(TRIGGER, overlay)
}

/// Product detail page without an availability widget.
#[must_use]
pub fn product_page_without_widget() -> FixturePage {
    FixturePage::html("<html><body><h1>Product</h1><p>Only online</p></body></html>")
}
