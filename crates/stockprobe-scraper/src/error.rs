use thiserror::Error;

use stockprobe_core::{Stage, Target};

use crate::session::SessionError;

/// Failures that cross the pipeline boundary.
///
/// Selector misses, transient errors and per-item parse failures are
/// absorbed inside each stage; only these reach the caller.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("seed page {url} produced no category links")]
    SeedEmpty { url: String },

    #[error("no categories to list products from")]
    NoCategories,

    #[error("{stage} stage produced no results after {attempts} attempts")]
    EmptyStage { stage: &'static str, attempts: u32 },

    #[error("no {target} selector configured for the {stage} stage")]
    MissingSelector { target: Target, stage: Stage },

    #[error("invalid selector \"{selector}\": {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("failed to close browser session: {0}")]
    Close(#[source] SessionError),
}
