//! Per-product pickup availability probing.
//!
//! Each product runs through a small state machine on the shared session:
//!
//! ```text
//! Navigate -> TriggerWidget -> WaitOverlay -> ReadStock -> CloseOverlay -> Done
//!    ^             |               |              |
//!    +-------------+---------------+--------------+  (transient error, within budget)
//! ```
//!
//! A missing trigger ends the product with no record. Non-transient errors
//! and exhausted retries skip the product.

use stockprobe_core::{
    AppConfig, ProductSummary, SelectorContext, SelectorRegistry, Stage, StockRecord, Target,
};

use crate::error::ScraperError;
use crate::parse::{first_integer, resolve_url};
use crate::retry::{RetryKind, RetryState};
use crate::session::{PageSession, SessionError};

/// Selector groups for the availability widget.
///
/// Candidates are joined into one CSS selector group, and the stock line and
/// location entries are scoped under the overlay.
#[derive(Debug, Clone)]
struct ProbeSelectors {
    trigger: String,
    overlay: String,
    stock_line: String,
    pickup_location: String,
    close: Option<String>,
}

impl ProbeSelectors {
    fn resolve(registry: &SelectorRegistry) -> Result<Self, ScraperError> {
        let ctx = SelectorContext::new(Stage::Probe, 0);
        let candidates = |target| {
            registry
                .selectors_for(target, ctx)
                .map(|set| set.candidates().collect::<Vec<_>>())
        };
        let required = |target| {
            candidates(target).ok_or(ScraperError::MissingSelector {
                target,
                stage: Stage::Probe,
            })
        };

        let overlay = required(Target::AvailabilityOverlay)?;
        Ok(Self {
            trigger: required(Target::AvailabilityTrigger)?.join(", "),
            stock_line: scoped(&overlay, &required(Target::StockLine)?),
            pickup_location: scoped(&overlay, &required(Target::PickupLocation)?),
            close: candidates(Target::OverlayClose).map(|c| c.join(", ")),
            overlay: overlay.join(", "),
        })
    }
}

/// Every `outer inner` descendant combination as one selector group.
fn scoped(outer: &[&str], inner: &[&str]) -> String {
    let mut parts = Vec::with_capacity(outer.len() * inner.len());
    for o in outer {
        for i in inner {
            parts.push(format!("{o} {i}"));
        }
    }
    parts.join(", ")
}

#[derive(Debug)]
enum ProbeOutcome {
    Available(StockRecord),
    BelowThreshold { stock_level: u32, locations: usize },
    NoWidget,
    Skipped(String),
}

enum ProbeState {
    Navigate,
    TriggerWidget,
    WaitOverlay,
    ReadStock,
    CloseOverlay(ProbeOutcome),
    Done(ProbeOutcome),
}

/// Outcome counts for one probing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub available: usize,
    pub below_threshold: usize,
    pub no_widget: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    pub records: Vec<StockRecord>,
    pub summary: ProbeSummary,
}

impl ProbeReport {
    fn record(&mut self, product: &ProductSummary, outcome: ProbeOutcome) {
        let product_id = product.log_id();
        match outcome {
            ProbeOutcome::Available(record) => {
                tracing::info!(product_id, stock_level = record.stock_level(), "product available");
                self.summary.available += 1;
                self.records.push(record);
            }
            ProbeOutcome::BelowThreshold {
                stock_level,
                locations,
            } => {
                tracing::debug!(product_id, stock_level, locations, "product below threshold");
                self.summary.below_threshold += 1;
            }
            ProbeOutcome::NoWidget => {
                tracing::debug!(product_id, "no availability widget");
                self.summary.no_widget += 1;
            }
            ProbeOutcome::Skipped(reason) => {
                tracing::warn!(product_id, reason = %reason, "product skipped");
                self.summary.skipped += 1;
            }
        }
    }
}

/// Probes each product in order and keeps the ones that qualify.
///
/// `probe_delay_ms` separates successive products whatever their outcome.
///
/// # Errors
///
/// Returns [`ScraperError::MissingSelector`] if the registry lacks a
/// required probe selector. Per-product failures never surface here.
pub async fn probe_availability<S: PageSession>(
    session: &mut S,
    registry: &SelectorRegistry,
    config: &AppConfig,
    retry: &mut RetryState,
    products: &[ProductSummary],
) -> Result<ProbeReport, ScraperError> {
    let selectors = ProbeSelectors::resolve(registry)?;
    let mut report = ProbeReport::default();
    tracing::info!(products = products.len(), "availability probe started");

    for (index, product) in products.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(config.probe_delay()).await;
        }
        retry.reset(RetryKind::ProbeTransient);
        let outcome = probe_product(session, &selectors, config, retry, product).await;
        report.record(product, outcome);
    }

    let ProbeSummary {
        available,
        below_threshold,
        no_widget,
        skipped,
    } = report.summary;
    tracing::info!(
        available,
        below_threshold,
        no_widget,
        skipped,
        "availability probe complete"
    );
    Ok(report)
}

async fn probe_product<S: PageSession>(
    session: &mut S,
    selectors: &ProbeSelectors,
    config: &AppConfig,
    retry: &mut RetryState,
    product: &ProductSummary,
) -> ProbeOutcome {
    let Some(path) = product.url.as_deref() else {
        return ProbeOutcome::Skipped("product has no url".to_string());
    };
    let Some(url) = resolve_url(&config.base_url, path).map(String::from) else {
        return ProbeOutcome::Skipped(format!("unresolvable product url {path}"));
    };
    let mut state = ProbeState::Navigate;

    loop {
        let step = match state {
            ProbeState::Done(outcome) => return outcome,
            ProbeState::CloseOverlay(outcome) => {
                close_overlay(session, selectors, product).await;
                Ok(ProbeState::Done(outcome))
            }
            ProbeState::Navigate => session.goto(&url).await.map(|()| ProbeState::TriggerWidget),
            ProbeState::TriggerWidget => trigger_widget(session, selectors).await,
            ProbeState::WaitOverlay => session
                .wait_for_selector(&selectors.overlay, config.overlay_timeout())
                .await
                .map(|_| ProbeState::ReadStock),
            ProbeState::ReadStock => read_stock(session, selectors, product).await,
        };

        state = match step {
            Ok(next) => next,
            Err(err) if err.is_transient() => {
                let attempt = retry.failures(RetryKind::ProbeTransient) + 1;
                if retry.record_failure(RetryKind::ProbeTransient) {
                    tracing::warn!(
                        product_id = product.log_id(),
                        attempt,
                        error = %err,
                        "transient probe error; retrying from navigation"
                    );
                    tokio::time::sleep(config.probe_delay()).await;
                    ProbeState::Navigate
                } else {
                    ProbeState::Done(ProbeOutcome::Skipped(format!(
                        "transient error after {attempt} attempts: {err}"
                    )))
                }
            }
            Err(err) => ProbeState::Done(ProbeOutcome::Skipped(err.to_string())),
        };
    }
}

async fn trigger_widget<S: PageSession>(
    session: &mut S,
    selectors: &ProbeSelectors,
) -> Result<ProbeState, SessionError> {
    let Some(trigger) = session.query_selector(&selectors.trigger).await? else {
        return Ok(ProbeState::Done(ProbeOutcome::NoWidget));
    };
    session.click(&trigger).await?;
    Ok(ProbeState::WaitOverlay)
}

async fn read_stock<S: PageSession>(
    session: &mut S,
    selectors: &ProbeSelectors,
    product: &ProductSummary,
) -> Result<ProbeState, SessionError> {
    let Some(line) = session.query_selector(&selectors.stock_line).await? else {
        return Ok(ProbeState::CloseOverlay(ProbeOutcome::Skipped(
            "stock line not found in overlay".to_string(),
        )));
    };
    let text = session.read_text(&line).await?;
    let Some(stock_level) = first_integer(&text) else {
        return Ok(ProbeState::CloseOverlay(ProbeOutcome::Skipped(format!(
            "no stock count in {:?}",
            text.trim()
        ))));
    };
    let locations = session.query_all(&selectors.pickup_location).await?.len();

    let outcome = match StockRecord::qualify(product.clone(), stock_level, locations) {
        Some(record) => ProbeOutcome::Available(record),
        None => ProbeOutcome::BelowThreshold {
            stock_level,
            locations,
        },
    };
    Ok(ProbeState::CloseOverlay(outcome))
}

/// Best-effort dismissal; errors are logged and otherwise ignored.
async fn close_overlay<S: PageSession>(
    session: &mut S,
    selectors: &ProbeSelectors,
    product: &ProductSummary,
) {
    let Some(close) = selectors.close.as_deref() else {
        return;
    };
    let result = match session.query_selector(close).await {
        Ok(Some(button)) => session.click(&button).await,
        Ok(None) => Ok(()),
        Err(err) => Err(err),
    };
    if let Err(err) = result {
        tracing::debug!(product_id = product.log_id(), error = %err, "overlay close failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_probe_selectors_scope_under_overlay() {
        let selectors = ProbeSelectors::resolve(&SelectorRegistry::builtin()).unwrap();
        assert_eq!(selectors.trigger, "button.sc-58bde996-0.bQTVcy");
        assert_eq!(
            selectors.stock_line,
            "div.sc-d0d34be1-2.dMCIvG div.sc-dbd9c505-1.fwiPKQ"
        );
        assert_eq!(selectors.pickup_location, "div.sc-d0d34be1-2.dMCIvG strong");
        assert!(selectors.close.is_some());
    }

    #[test]
    fn scoped_expands_every_combination() {
        assert_eq!(
            scoped(&["div.a", "div.b"], &["span.x"]),
            "div.a span.x, div.b span.x"
        );
    }
}
