use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a variable is set to an invalid value.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a variable is set to an invalid value.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let at_least_one = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let value: u32 = parse_as(var, &or_default(var, default))?;
        if value == 0 {
            return Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(value)
    };

    let env = parse_environment(&or_default("STOCKPROBE_ENV", "development"))?;
    let bind_addr: SocketAddr =
        parse_as("STOCKPROBE_BIND_ADDR", &or_default("STOCKPROBE_BIND_ADDR", "0.0.0.0:3000"))?;
    let log_level = or_default("STOCKPROBE_LOG_LEVEL", "info");

    let base_url = or_default("STOCKPROBE_BASE_URL", "https://www.galaxus.ch");
    if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
        return Err(ConfigError::InvalidEnvVar {
            var: "STOCKPROBE_BASE_URL".to_string(),
            reason: format!("\"{base_url}\" is not an http(s) origin"),
        });
    }
    let seed_path = or_default("STOCKPROBE_SEED_PATH", "/");

    let selectors_path = optional("STOCKPROBE_SELECTORS_PATH").map(PathBuf::from);
    let snapshot_dir = PathBuf::from(or_default("STOCKPROBE_SNAPSHOT_DIR", "./data"));

    let crawl_max_depth = at_least_one("STOCKPROBE_CRAWL_MAX_DEPTH", "4")?;
    let category_limit: usize = parse_as(
        "STOCKPROBE_CATEGORY_LIMIT",
        &or_default("STOCKPROBE_CATEGORY_LIMIT", "5"),
    )?;
    let retry_budget = at_least_one("STOCKPROBE_RETRY_BUDGET", "3")?;
    let selector_retry_delay_ms: u64 = parse_as(
        "STOCKPROBE_SELECTOR_RETRY_DELAY_MS",
        &or_default("STOCKPROBE_SELECTOR_RETRY_DELAY_MS", "2000"),
    )?;
    let page_settle_delay_ms: u64 = parse_as(
        "STOCKPROBE_PAGE_SETTLE_DELAY_MS",
        &or_default("STOCKPROBE_PAGE_SETTLE_DELAY_MS", "500"),
    )?;
    let probe_delay_ms: u64 = parse_as(
        "STOCKPROBE_PROBE_DELAY_MS",
        &or_default("STOCKPROBE_PROBE_DELAY_MS", "1000"),
    )?;
    let overlay_timeout_ms: u64 = parse_as(
        "STOCKPROBE_OVERLAY_TIMEOUT_MS",
        &or_default("STOCKPROBE_OVERLAY_TIMEOUT_MS", "5000"),
    )?;
    let max_stage_attempts = at_least_one("STOCKPROBE_MAX_STAGE_ATTEMPTS", "3")?;

    let browser_headless = parse_bool(
        "STOCKPROBE_BROWSER_HEADLESS",
        &or_default("STOCKPROBE_BROWSER_HEADLESS", "true"),
    )?;
    let chrome_path = optional("STOCKPROBE_CHROME_PATH").map(PathBuf::from);

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        base_url,
        seed_path,
        selectors_path,
        snapshot_dir,
        crawl_max_depth,
        category_limit,
        retry_budget,
        selector_retry_delay_ms,
        page_settle_delay_ms,
        probe_delay_ms,
        overlay_timeout_ms,
        max_stage_attempts,
        browser_headless,
        chrome_path,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for anything other than
/// `development`, `test` or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "STOCKPROBE_ENV".to_string(),
            reason: format!("unknown environment \"{other}\""),
        }),
    }
}

fn parse_as<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: format!("expected a boolean, got \"{other}\""),
        }),
    }
}
