mod api;

use stockprobe_core::{load_selector_registry, SelectorRegistry};
use stockprobe_scraper::{check_selectors, ChromiumLauncher};
use tracing_subscriber::EnvFilter;

use crate::api::{build_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = stockprobe_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let registry = match &config.selectors_path {
        Some(path) => load_selector_registry(path)?,
        None => SelectorRegistry::builtin(),
    };
    check_selectors(&registry)?;
    tracing::info!(
        env = %config.env,
        selectors_version = registry.version,
        snapshot_dir = %config.snapshot_dir.display(),
        "configuration loaded"
    );

    let launcher = ChromiumLauncher::from_config(&config);
    let bind_addr = config.bind_addr;
    let app = build_app(AppState::new(launcher, registry, config));

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
