//! Bulk extraction over rendered markup with the `scraper` crate.
//!
//! `scraper::Html` is not `Send`, so documents are parsed and dropped inside
//! synchronous functions and never held across an `.await`.

use scraper::{ElementRef, Selector};
use stockprobe_core::SelectorRegistry;

use crate::error::ScraperError;
use crate::parse::clean_text;

/// Compiles a primary/fallback candidate list, keeping its order.
pub(crate) fn compile(candidates: &[&str]) -> Result<Vec<Selector>, ScraperError> {
    candidates
        .iter()
        .map(|raw| {
            Selector::parse(raw).map_err(|e| ScraperError::InvalidSelector {
                selector: (*raw).to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Compiles every primary and fallback selector in `registry`.
///
/// `SelectorRegistry::validate` only checks the table's structure.
///
/// # Errors
///
/// Returns [`ScraperError::InvalidSelector`] for the first selector that
/// does not parse as CSS.
pub fn check_selectors(registry: &SelectorRegistry) -> Result<(), ScraperError> {
    for entry in &registry.selectors {
        let mut candidates = vec![entry.primary.as_str()];
        candidates.extend(entry.fallback.as_deref());
        compile(&candidates)?;
    }
    Ok(())
}

/// Whitespace-normalized text content of `el`.
pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<Vec<_>>().join(" "))
}

/// Text of the first non-empty match under `el`, trying candidates in order.
pub(crate) fn first_text(el: ElementRef<'_>, candidates: &[Selector]) -> Option<String> {
    candidates.iter().find_map(|sel| {
        el.select(sel)
            .map(text_of)
            .find(|text| !text.is_empty())
    })
}

/// Non-empty `attr` of the first match carrying it, trying candidates in order.
pub(crate) fn first_attr(el: ElementRef<'_>, candidates: &[Selector], attr: &str) -> Option<String> {
    candidates.iter().find_map(|sel| {
        el.select(sel)
            .filter_map(|m| m.value().attr(attr))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_owned)
    })
}
