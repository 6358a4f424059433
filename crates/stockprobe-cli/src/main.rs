mod stages;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stockprobe_scraper::ChromiumLauncher;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "stockprobe-cli")]
#[command(about = "Crawl categories, list in-stock products and probe pickup availability")]
struct Cli {
    /// Print the effective configuration and exit without launching a browser.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Crawl the category graph and write the categories snapshot.
    Categories {
        /// Output path (defaults to `<snapshot dir>/categories.json`).
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List and probe products for a categories snapshot.
    Products {
        /// Input categories snapshot (defaults to `<snapshot dir>/categories.json`).
        #[arg(long)]
        categories: Option<PathBuf>,
        /// Output path (defaults to `<snapshot dir>/products.json`).
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run every stage and write both snapshots to the snapshot directory.
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = stockprobe_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let registry = stages::load_registry(config.selectors_path.as_deref())?;

    if cli.dry_run {
        print!("{}", stages::describe_config(&config, &registry));
        return Ok(());
    }

    let launcher = ChromiumLauncher::from_config(&config);
    match cli.command {
        Commands::Categories { out } => {
            stages::run_categories(&launcher, registry, config, out).await?;
        }
        Commands::Products { categories, out } => {
            stages::run_products(&launcher, registry, config, categories, out).await?;
        }
        Commands::Run => {
            stages::run_all(&launcher, registry, config).await?;
        }
    }

    Ok(())
}
