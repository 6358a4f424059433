use axum::{extract::State, Json};
use stockprobe_core::{read_snapshot, write_snapshot, CategoryLink, StockRecord};
use stockprobe_scraper::{Pipeline, ScraperError, SessionLauncher};

use super::{map_scraper_error, map_snapshot_error, ApiError, AppState};

async fn open_pipeline<L: SessionLauncher>(
    state: &AppState<L>,
) -> Result<Pipeline<L::Session>, ApiError> {
    let session = state
        .launcher
        .launch()
        .await
        .map_err(|e| map_scraper_error(&ScraperError::Session(e)))?;
    Ok(Pipeline::new(
        session,
        state.registry.as_ref().clone(),
        state.config.as_ref().clone(),
    ))
}

/// `GET /api/data/categories`: crawl, persist `categories.json`, return it.
pub(super) async fn discover_categories<L>(
    State(state): State<AppState<L>>,
) -> Result<Json<Vec<CategoryLink>>, ApiError>
where
    L: SessionLauncher + 'static,
{
    let _run = state.run_lock.try_lock().map_err(|_| ApiError::busy())?;

    let mut pipeline = open_pipeline(&state).await?;
    let result = pipeline.discover_categories().await;
    let categories = pipeline
        .finish(result)
        .await
        .map_err(|e| map_scraper_error(&e))?;

    write_snapshot(&state.snapshots.categories_path(), &categories)
        .map_err(|e| map_snapshot_error(&e))?;
    Ok(Json(categories))
}

/// `GET /api/data/products`: list and probe the persisted categories,
/// persist `products.json`, return the records.
pub(super) async fn collect_products<L>(
    State(state): State<AppState<L>>,
) -> Result<Json<Vec<StockRecord>>, ApiError>
where
    L: SessionLauncher + 'static,
{
    let _run = state.run_lock.try_lock().map_err(|_| ApiError::busy())?;

    let categories: Vec<CategoryLink> = read_snapshot(&state.snapshots.categories_path())
        .map_err(|e| map_snapshot_error(&e))?;

    let mut pipeline = open_pipeline(&state).await?;
    let result = pipeline.collect_stock(&categories).await;
    let records = pipeline
        .finish(result)
        .await
        .map_err(|e| map_scraper_error(&e))?;

    write_snapshot(&state.snapshots.products_path(), &records)
        .map_err(|e| map_snapshot_error(&e))?;
    Ok(Json(records))
}
