pub mod app_config;
pub mod config;
pub mod products;
pub mod selectors;
pub mod snapshot;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use products::{
    dedup_by_url, derive_product_id, CategoryLink, ProductSummary, StockRecord, MIN_STOCK_LEVEL,
};
pub use selectors::{
    load_selector_registry, SelectorContext, SelectorEntry, SelectorRegistry, SelectorSet,
    SiteCorrection, Stage, Target,
};
pub use snapshot::{read_snapshot, write_snapshot, SnapshotError, SnapshotStore};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read selectors file {path}: {source}")]
    SelectorsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse selectors file: {0}")]
    SelectorsFileParse(#[source] serde_yaml::Error),

    #[error("selector registry validation failed: {0}")]
    Validation(String),
}
