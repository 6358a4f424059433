use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Runtime configuration shared by the CLI and the HTTP server.
///
/// Built from `STOCKPROBE_*` environment variables by
/// [`crate::load_app_config`]; every field has a default.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Retailer origin, e.g. `"https://www.galaxus.ch"`. Extracted hrefs are
    /// path-relative and resolved against this.
    pub base_url: String,
    /// Path of the landing page the category crawl starts from.
    pub seed_path: String,
    /// YAML selector table replacing the built-in one, when set.
    pub selectors_path: Option<PathBuf>,
    pub snapshot_dir: PathBuf,
    /// Number of page levels the category crawl visits (the seed is level 0).
    pub crawl_max_depth: u32,
    /// How many discovered categories the product lister visits per run.
    pub category_limit: usize,
    /// Attempts allowed per retry kind before an item or branch is given up.
    pub retry_budget: u32,
    pub selector_retry_delay_ms: u64,
    pub page_settle_delay_ms: u64,
    pub probe_delay_ms: u64,
    pub overlay_timeout_ms: u64,
    /// Times the driver re-runs listing + probing when it yields nothing.
    pub max_stage_attempts: u32,
    pub browser_headless: bool,
    pub chrome_path: Option<PathBuf>,
}

impl AppConfig {
    /// Joins [`AppConfig::base_url`] and [`AppConfig::seed_path`].
    #[must_use]
    pub fn seed_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.seed_path.trim_start_matches('/')
        )
    }

    #[must_use]
    pub fn selector_retry_delay(&self) -> Duration {
        Duration::from_millis(self.selector_retry_delay_ms)
    }

    #[must_use]
    pub fn page_settle_delay(&self) -> Duration {
        Duration::from_millis(self.page_settle_delay_ms)
    }

    #[must_use]
    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }

    #[must_use]
    pub fn overlay_timeout(&self) -> Duration {
        Duration::from_millis(self.overlay_timeout_ms)
    }
}
