//! Stage orchestration over one shared page session.

use stockprobe_core::{dedup_by_url, AppConfig, CategoryLink, SelectorRegistry, StockRecord};

use crate::availability::probe_availability;
use crate::categories::crawl_categories;
use crate::error::ScraperError;
use crate::products::list_products;
use crate::retry::RetryState;
use crate::session::PageSession;

/// Result of a full [`Pipeline::run`].
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub categories: Vec<CategoryLink>,
    pub records: Vec<StockRecord>,
}

/// Drives crawl, listing and probing strictly in sequence.
///
/// The pipeline owns its session. Call [`Pipeline::finish`] with the stage
/// result to close the browser on every exit path.
pub struct Pipeline<S: PageSession> {
    session: S,
    registry: SelectorRegistry,
    config: AppConfig,
}

impl<S: PageSession> Pipeline<S> {
    #[must_use]
    pub fn new(session: S, registry: SelectorRegistry, config: AppConfig) -> Self {
        Self {
            session,
            registry,
            config,
        }
    }

    #[must_use]
    pub fn session(&self) -> &S {
        &self.session
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Crawls the category graph from the configured seed.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::SeedEmpty`] if the seed yields no links, or a
    /// selector configuration error.
    pub async fn discover_categories(&mut self) -> Result<Vec<CategoryLink>, ScraperError> {
        let mut retry = RetryState::new(self.config.retry_budget);
        tracing::info!(
            seed = %self.config.seed_url(),
            max_depth = self.config.crawl_max_depth,
            "category discovery started"
        );
        crawl_categories(&mut self.session, &self.registry, &self.config, &mut retry).await
    }

    /// Lists and probes products for `categories`, re-running both stages
    /// from scratch while they yield nothing, up to `max_stage_attempts`.
    ///
    /// Categories sharing a URL are listed once. Records are deduplicated by
    /// product URL, first occurrence kept.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::NoCategories`] for an empty input and
    /// [`ScraperError::EmptyStage`] once every attempt came back empty.
    pub async fn collect_stock(
        &mut self,
        categories: &[CategoryLink],
    ) -> Result<Vec<StockRecord>, ScraperError> {
        let categories_in = categories.len();
        if categories_in == 0 {
            return Err(ScraperError::NoCategories);
        }
        let categories = dedup_by_url(categories.to_vec(), |c| Some(c.url.as_str()));
        if categories.len() < categories_in {
            tracing::debug!(
                dropped = categories_in - categories.len(),
                "duplicate category urls dropped"
            );
        }

        let max_attempts = self.config.max_stage_attempts.max(1);
        for attempt in 1..=max_attempts {
            let mut retry = RetryState::new(self.config.retry_budget);
            let products = list_products(
                &mut self.session,
                &self.registry,
                &self.config,
                &mut retry,
                &categories,
            )
            .await?;
            let report = probe_availability(
                &mut self.session,
                &self.registry,
                &self.config,
                &mut retry,
                &products,
            )
            .await?;

            let records = dedup_by_url(report.records, StockRecord::url);
            if !records.is_empty() {
                tracing::info!(attempt, records = records.len(), "stock collection complete");
                return Ok(records);
            }
            tracing::warn!(
                attempt,
                max_attempts,
                listed = products.len(),
                "no available products; re-running listing and probing"
            );
        }

        Err(ScraperError::EmptyStage {
            stage: "products",
            attempts: max_attempts,
        })
    }

    /// Runs every stage end to end.
    ///
    /// # Errors
    ///
    /// Propagates the first fatal stage error.
    pub async fn run(&mut self) -> Result<RunOutput, ScraperError> {
        let categories = self.discover_categories().await?;
        let records = self.collect_stock(&categories).await?;
        Ok(RunOutput {
            categories,
            records,
        })
    }

    /// Closes the session and hands back `result`.
    ///
    /// A close failure is surfaced only when `result` succeeded; otherwise it
    /// is logged and the stage error wins.
    ///
    /// # Errors
    ///
    /// Returns the stage error, or [`ScraperError::Close`].
    pub async fn finish<T>(mut self, result: Result<T, ScraperError>) -> Result<T, ScraperError> {
        match (self.session.close().await, result) {
            (Ok(()), result) => result,
            (Err(close_err), Ok(_)) => {
                tracing::error!(error = %close_err, "failed to close browser session");
                Err(ScraperError::Close(close_err))
            }
            (Err(close_err), Err(err)) => {
                tracing::warn!(error = %close_err, "failed to close browser session after stage error");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
