pub mod availability;
pub mod categories;
pub mod chromium;
pub mod error;
mod markup;
pub mod parse;
pub mod pipeline;
pub mod products;
pub mod retry;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use availability::{probe_availability, ProbeReport, ProbeSummary};
pub use categories::crawl_categories;
pub use chromium::{ChromiumLauncher, ChromiumSession};
pub use error::ScraperError;
pub use markup::check_selectors;
pub use pipeline::{Pipeline, RunOutput};
pub use products::list_products;
pub use retry::{RetryKind, RetryState};
pub use session::{PageSession, SessionError, SessionLauncher};
