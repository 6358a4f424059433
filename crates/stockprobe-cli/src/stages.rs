//! Command handlers. Each one launches a single browser session, drives the
//! pipeline stages it needs, closes the session and writes snapshots.

use std::path::{Path, PathBuf};

use anyhow::Context;
use stockprobe_core::{
    load_selector_registry, read_snapshot, write_snapshot, AppConfig, CategoryLink,
    SelectorRegistry, SnapshotStore, StockRecord,
};
use stockprobe_scraper::{check_selectors, Pipeline, RunOutput, SessionLauncher};

/// The table at `path`, or the built-in one, with every selector compiled.
pub(crate) fn load_registry(path: Option<&Path>) -> anyhow::Result<SelectorRegistry> {
    let registry = match path {
        Some(path) => load_selector_registry(path)?,
        None => SelectorRegistry::builtin(),
    };
    check_selectors(&registry)?;
    Ok(registry)
}

async fn open_pipeline<L: SessionLauncher>(
    launcher: &L,
    registry: SelectorRegistry,
    config: AppConfig,
) -> anyhow::Result<Pipeline<L::Session>> {
    let session = launcher
        .launch()
        .await
        .context("failed to start browser session")?;
    Ok(Pipeline::new(session, registry, config))
}

/// Crawls categories and writes them to `out` or the default snapshot.
pub(crate) async fn run_categories<L: SessionLauncher>(
    launcher: &L,
    registry: SelectorRegistry,
    config: AppConfig,
    out: Option<PathBuf>,
) -> anyhow::Result<Vec<CategoryLink>> {
    let out = out.unwrap_or_else(|| SnapshotStore::new(config.snapshot_dir.clone()).categories_path());

    let mut pipeline = open_pipeline(launcher, registry, config).await?;
    let result = pipeline.discover_categories().await;
    let categories = pipeline.finish(result).await?;

    write_snapshot(&out, &categories)?;
    println!("wrote {} categories to {}", categories.len(), out.display());
    Ok(categories)
}

/// Lists and probes the categories in `input`, writing qualifying records.
pub(crate) async fn run_products<L: SessionLauncher>(
    launcher: &L,
    registry: SelectorRegistry,
    config: AppConfig,
    input: Option<PathBuf>,
    out: Option<PathBuf>,
) -> anyhow::Result<Vec<StockRecord>> {
    let store = SnapshotStore::new(config.snapshot_dir.clone());
    let input = input.unwrap_or_else(|| store.categories_path());
    let out = out.unwrap_or_else(|| store.products_path());

    let categories: Vec<CategoryLink> = read_snapshot(&input).with_context(|| {
        format!(
            "cannot read categories from {}; run `stockprobe-cli categories` first",
            input.display()
        )
    })?;

    let mut pipeline = open_pipeline(launcher, registry, config).await?;
    let result = pipeline.collect_stock(&categories).await;
    let records = pipeline.finish(result).await?;

    write_snapshot(&out, &records)?;
    println!("wrote {} stock records to {}", records.len(), out.display());
    Ok(records)
}

/// Runs every stage on one session and writes both default snapshots.
pub(crate) async fn run_all<L: SessionLauncher>(
    launcher: &L,
    registry: SelectorRegistry,
    config: AppConfig,
) -> anyhow::Result<RunOutput> {
    let store = SnapshotStore::new(config.snapshot_dir.clone());

    let mut pipeline = open_pipeline(launcher, registry, config).await?;
    let result = pipeline.run().await;
    let output = pipeline.finish(result).await?;

    write_snapshot(&store.categories_path(), &output.categories)?;
    write_snapshot(&store.products_path(), &output.records)?;
    println!(
        "wrote {} categories and {} stock records to {}",
        output.categories.len(),
        output.records.len(),
        store.dir().display()
    );
    Ok(output)
}

/// Human-readable effective configuration for `--dry-run`.
pub(crate) fn describe_config(config: &AppConfig, registry: &SelectorRegistry) -> String {
    let selectors = config.selectors_path.as_ref().map_or_else(
        || format!("built-in (version {})", registry.version),
        |path| format!("{} (version {})", path.display(), registry.version),
    );
    let chrome = config
        .chrome_path
        .as_ref()
        .map_or_else(|| "auto-detect".to_string(), |p| p.display().to_string());

    let lines = [
        format!("env: {}", config.env),
        format!("seed: {}", config.seed_url()),
        format!("selectors: {selectors}"),
        format!("snapshot dir: {}", config.snapshot_dir.display()),
        format!("crawl max depth: {}", config.crawl_max_depth),
        format!("category limit: {}", config.category_limit),
        format!("retry budget: {}", config.retry_budget),
        format!("max stage attempts: {}", config.max_stage_attempts),
        format!(
            "delays (ms): selector retry {}, page settle {}, probe {}, overlay timeout {}",
            config.selector_retry_delay_ms,
            config.page_settle_delay_ms,
            config.probe_delay_ms,
            config.overlay_timeout_ms
        ),
        format!("browser: headless {}, chrome {chrome}", config.browser_headless),
    ];
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
