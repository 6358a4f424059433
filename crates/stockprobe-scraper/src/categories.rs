//! Breadth-first discovery of the retailer's category graph.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use scraper::Html;
use stockprobe_core::{
    dedup_by_url, AppConfig, CategoryLink, SelectorContext, SelectorRegistry, Stage, Target,
};

use crate::error::ScraperError;
use crate::markup::{compile, text_of};
use crate::parse::resolve_url;
use crate::retry::{RetryKind, RetryState};
use crate::session::{load_html, PageSession};

/// Crawls categories from the configured seed page.
///
/// The seed is level 0 and every link found on a level-`n` page is queued at
/// level `n + 1`, up to `crawl_max_depth` levels of pages. A URL is queued at
/// most once per crawl, so cross-links between branches are never expanded
/// twice. The returned set is the union of every page's links, deduplicated
/// by `url` with the first occurrence kept.
///
/// # Errors
///
/// Returns [`ScraperError::SeedEmpty`] if the seed page yields nothing after
/// retries, and [`ScraperError::InvalidSelector`] for a selector that does
/// not compile. Misses on deeper pages only empty that branch.
pub async fn crawl_categories<S: PageSession>(
    session: &mut S,
    registry: &SelectorRegistry,
    config: &AppConfig,
    retry: &mut RetryState,
) -> Result<Vec<CategoryLink>, ScraperError> {
    let seed = config.seed_url();
    let mut queued: HashSet<String> = HashSet::from([seed.clone()]);
    let mut frontier: VecDeque<(String, u32)> = VecDeque::from([(seed.clone(), 0)]);
    let mut found: Vec<CategoryLink> = Vec::new();
    let mut pages = 0usize;

    while let Some((url, level)) = frontier.pop_front() {
        let links = read_category_page(session, registry, config, retry, &url, level).await?;
        pages += 1;

        if level == 0 && links.is_empty() {
            return Err(ScraperError::SeedEmpty { url });
        }

        let expand = level + 1 < config.crawl_max_depth;
        for link in links {
            if expand {
                match resolve_url(&config.base_url, &link.url).map(String::from) {
                    Some(next) => {
                        if queued.insert(next.clone()) {
                            frontier.push_back((next, level + 1));
                        }
                    }
                    None => tracing::debug!(href = %link.url, "unresolvable category href, not expanding"),
                }
            }
            found.push(link);
        }
    }

    let extracted = found.len();
    let categories = dedup_by_url(found, |link| Some(link.url.as_str()));
    tracing::info!(
        pages,
        extracted,
        unique = categories.len(),
        "category crawl complete"
    );
    Ok(categories)
}

/// Reads one category page, re-navigating on a miss until the retry budget
/// runs out. Exhaustion yields an empty list.
async fn read_category_page<S: PageSession>(
    session: &mut S,
    registry: &SelectorRegistry,
    config: &AppConfig,
    retry: &mut RetryState,
    url: &str,
    level: u32,
) -> Result<Vec<CategoryLink>, ScraperError> {
    let ctx = SelectorContext::new(Stage::Categories, level);
    let Some(set) = registry.selectors_for(Target::CategoryLink, ctx) else {
        tracing::warn!(url, level, "no category_link selector for this level; branch skipped");
        return Ok(Vec::new());
    };
    let candidates: Vec<&str> = set.candidates().collect();
    let kind = RetryKind::CategorySelectorMiss;
    retry.reset(kind);

    loop {
        let reason = match load_html(session, url, Duration::ZERO).await {
            Ok(html) => match extract_links(&html, &candidates)? {
                Some(links) => {
                    retry.reset(kind);
                    return Ok(apply_corrections(registry, ctx, links));
                }
                None => "category selector matched nothing".to_string(),
            },
            Err(err) => err.to_string(),
        };

        let attempt = retry.failures(kind) + 1;
        if !retry.record_failure(kind) {
            tracing::warn!(url, level, attempt, reason = %reason, "category page exhausted retries; branch skipped");
            retry.reset(kind);
            return Ok(Vec::new());
        }
        tracing::warn!(url, level, attempt, reason = %reason, "category page miss; retrying");
        tokio::time::sleep(config.selector_retry_delay()).await;
    }
}

/// Anchor text and href pairs for the first candidate that matches anything.
///
/// `None` means no candidate matched at all. Anchors without an href are
/// dropped.
fn extract_links(html: &str, candidates: &[&str]) -> Result<Option<Vec<CategoryLink>>, ScraperError> {
    let selectors = compile(candidates)?;
    let doc = Html::parse_document(html);

    for selector in &selectors {
        let anchors: Vec<_> = doc.select(selector).collect();
        if anchors.is_empty() {
            continue;
        }
        let links = anchors
            .into_iter()
            .filter_map(|a| {
                let href = a.value().attr("href").map(str::trim).unwrap_or_default();
                (!href.is_empty()).then(|| CategoryLink {
                    name: text_of(a),
                    url: href.to_string(),
                })
            })
            .collect();
        return Ok(Some(links));
    }
    Ok(None)
}

fn apply_corrections(
    registry: &SelectorRegistry,
    ctx: SelectorContext,
    mut links: Vec<CategoryLink>,
) -> Vec<CategoryLink> {
    for correction in registry.corrections_for(ctx) {
        let keep = links.len().saturating_sub(correction.drop_trailing);
        tracing::debug!(
            correction = %correction.name,
            dropped = links.len() - keep,
            level = ctx.level,
            "site correction applied"
        );
        links.truncate(keep);
    }
    links
}
