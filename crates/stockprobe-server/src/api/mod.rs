mod data;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use stockprobe_core::{AppConfig, SelectorRegistry, SnapshotError, SnapshotStore};
use stockprobe_scraper::{ScraperError, SessionLauncher};
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared handler state. `run_lock` serializes every request that drives the
/// browser.
pub struct AppState<L> {
    pub launcher: Arc<L>,
    pub registry: Arc<SelectorRegistry>,
    pub config: Arc<AppConfig>,
    pub snapshots: SnapshotStore,
    pub run_lock: Arc<Mutex<()>>,
}

impl<L> AppState<L> {
    pub fn new(launcher: L, registry: SelectorRegistry, config: AppConfig) -> Self {
        let snapshots = SnapshotStore::new(config.snapshot_dir.clone());
        Self {
            launcher: Arc::new(launcher),
            registry: Arc::new(registry),
            config: Arc::new(config),
            snapshots,
            run_lock: Arc::new(Mutex::new(())),
        }
    }
}

impl<L> Clone for AppState<L> {
    fn clone(&self) -> Self {
        Self {
            launcher: Arc::clone(&self.launcher),
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            snapshots: self.snapshots.clone(),
            run_lock: Arc::clone(&self.run_lock),
        }
    }
}

/// Error envelope: `{ "error": "..." }` with a non-2xx status.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    pub error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }

    fn busy() -> Self {
        Self::new(
            StatusCode::CONFLICT,
            "a scrape is already in progress; retry once it finishes",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self)).into_response()
    }
}

pub(super) fn map_scraper_error(error: &ScraperError) -> ApiError {
    tracing::error!(error = %error, "pipeline stage failed");
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
}

pub(super) fn map_snapshot_error(error: &SnapshotError) -> ApiError {
    match error {
        SnapshotError::NotFound { .. } => {
            tracing::warn!(error = %error, "upstream snapshot missing");
            ApiError::new(
                StatusCode::NOT_FOUND,
                format!("{error}; run /api/data/categories first"),
            )
        }
        _ => {
            tracing::error!(error = %error, "snapshot persistence failed");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    run_in_progress: bool,
    checked_at: DateTime<Utc>,
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE])
}

pub fn build_app<L>(state: AppState<L>) -> Router
where
    L: SessionLauncher + 'static,
{
    Router::new()
        .route("/api/health", get(health::<L>))
        .route("/api/data/categories", get(data::discover_categories::<L>))
        .route("/api/data/products", get(data::collect_products::<L>))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors()),
        )
        .with_state(state)
}

async fn health<L>(State(state): State<AppState<L>>) -> impl IntoResponse
where
    L: SessionLauncher + 'static,
{
    Json(HealthData {
        status: "ok",
        run_in_progress: state.run_lock.try_lock().is_err(),
        checked_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use stockprobe_core::{read_snapshot, CategoryLink};
    use stockprobe_scraper::testing::{
        category_page, fixture_config, landing_page, listing_page, product_card, product_page,
        FixtureLauncher, FixturePage, FixtureSite,
    };
    use tower::ServiceExt;

    use super::*;

    fn test_config(snapshot_dir: PathBuf) -> AppConfig {
        let mut config = fixture_config();
        config.snapshot_dir = snapshot_dir;
        config.selector_retry_delay_ms = 0;
        config.page_settle_delay_ms = 0;
        config.probe_delay_ms = 0;
        config
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("stockprobe-server-{}", uuid::Uuid::new_v4()))
    }

    fn shop() -> FixtureSite {
        FixtureSite::new()
            .with_page(
                "/",
                FixturePage::html(landing_page(&[
                    ("Phones", "/c/phones-24"),
                    ("Deals", "/promo/deals"),
                    ("Outlet", "/promo/outlet"),
                ])),
            )
            .with_page("/c/phones-24", FixturePage::html(category_page(&[])))
            .with_page(
                "/c/phones-24?filter=t_off%3DInStock&so=15",
                FixturePage::html(listing_page(&[product_card(
                    "iPhone 15",
                    "Apple",
                    "CHF 799.00",
                    Some("/p/apple-iphone-15-38432157"),
                )])),
            )
            .with_page("/p/apple-iphone-15-38432157", product_page("12 items in stock", 2))
    }

    fn app_with(launcher: FixtureLauncher, dir: PathBuf) -> (Router, AppState<FixtureLauncher>) {
        let state = AppState::new(launcher, SelectorRegistry::builtin(), test_config(dir));
        (build_app(state.clone()), state)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = serde_json::from_slice(&body).expect("json parse");
        (status, json)
    }

    #[test]
    fn api_error_serializes_only_the_message() {
        let err = ApiError::new(StatusCode::CONFLICT, "busy");
        let json = serde_json::to_value(&err).expect("serialize");
        assert_eq!(json, serde_json::json!({ "error": "busy" }));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn missing_snapshot_maps_to_not_found() {
        let err = map_snapshot_error(&SnapshotError::NotFound {
            path: "data/categories.json".to_string(),
        });
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(err.error.contains("categories.json"));
    }

    #[tokio::test]
    async fn health_reports_idle() {
        let (app, _) = app_with(FixtureLauncher::new(shop()), temp_dir());
        let (status, json) = get_json(app, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["run_in_progress"], false);
    }

    #[tokio::test]
    async fn categories_route_crawls_and_persists() {
        let dir = temp_dir();
        let (app, state) = app_with(FixtureLauncher::new(shop()), dir.clone());

        let (status, json) = get_json(app, "/api/data/categories").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            serde_json::json!([{ "name": "Phones", "url": "/c/phones-24" }])
        );
        let stored: Vec<CategoryLink> =
            read_snapshot(&state.snapshots.categories_path()).expect("snapshot written");
        assert_eq!(stored.len(), 1);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn products_route_without_categories_is_not_found() {
        let (app, _) = app_with(FixtureLauncher::new(shop()), temp_dir());
        let (status, json) = get_json(app, "/api/data/products").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().is_some_and(|e| e.contains("categories.json")));
    }

    #[tokio::test]
    async fn products_route_probes_persisted_categories() {
        let dir = temp_dir();
        let (app, state) = app_with(FixtureLauncher::new(shop()), dir.clone());

        let (status, _) = get_json(app.clone(), "/api/data/categories").await;
        assert_eq!(status, StatusCode::OK);
        let (status, json) = get_json(app, "/api/data/products").await;

        assert_eq!(status, StatusCode::OK);
        let records = json.as_array().expect("array");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], "38432157");
        assert_eq!(records[0]["stockLevel"], 12);
        assert_eq!(records[0]["pickupAvailable"], true);
        assert!(state.snapshots.products_path().exists());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn empty_seed_is_a_server_error() {
        let site = FixtureSite::new().with_page("/", FixturePage::html(landing_page(&[])));
        let (app, _) = app_with(FixtureLauncher::new(site), temp_dir());

        let (status, json) = get_json(app, "/api/data/categories").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn browser_launch_failure_is_a_server_error() {
        let (app, _) = app_with(FixtureLauncher::failing(), temp_dir());
        let (status, json) = get_json(app, "/api/data/categories").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"]
            .as_str()
            .is_some_and(|e| e.contains("chrome executable not found")));
    }

    #[tokio::test]
    async fn concurrent_run_is_rejected_with_conflict() {
        let (app, state) = app_with(FixtureLauncher::new(shop()), temp_dir());
        let _held = state.run_lock.lock().await;

        let (status, json) = get_json(app.clone(), "/api/data/categories").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].is_string());

        let (_, health) = get_json(app, "/api/health").await;
        assert_eq!(health["run_in_progress"], true);
    }
}
