//! Product-card extraction from in-stock category listings.

use scraper::{ElementRef, Html, Selector};
use stockprobe_core::{
    derive_product_id, AppConfig, CategoryLink, ProductSummary, SelectorContext,
    SelectorRegistry, Stage, Target,
};

use crate::error::ScraperError;
use crate::markup::{compile, first_attr, first_text};
use crate::parse::{parse_price, resolve_url, with_stock_filter};
use crate::retry::{RetryKind, RetryState};
use crate::session::{load_html, PageSession};

const LISTING: SelectorContext = SelectorContext::new(Stage::Listing, 0);

/// Candidate selectors for every card field, borrowed from the registry.
#[derive(Debug)]
struct CardSelectors<'a> {
    grid: Vec<&'a str>,
    card: Vec<&'a str>,
    name: Vec<&'a str>,
    brand: Vec<&'a str>,
    price: Vec<&'a str>,
    details: Vec<&'a str>,
    image: Vec<&'a str>,
    url: Vec<&'a str>,
    category: Vec<&'a str>,
}

impl<'a> CardSelectors<'a> {
    fn resolve(registry: &'a SelectorRegistry) -> Result<Self, ScraperError> {
        let optional = |target| {
            registry
                .selectors_for(target, LISTING)
                .map(|set| set.candidates().collect::<Vec<_>>())
                .unwrap_or_default()
        };
        let required = |target| {
            registry
                .selectors_for(target, LISTING)
                .map(|set| set.candidates().collect::<Vec<_>>())
                .ok_or(ScraperError::MissingSelector {
                    target,
                    stage: Stage::Listing,
                })
        };

        Ok(Self {
            grid: required(Target::ProductGrid)?,
            card: required(Target::ProductCard)?,
            name: required(Target::CardName)?,
            brand: optional(Target::CardBrand),
            price: required(Target::CardPrice)?,
            details: optional(Target::CardDetails),
            image: optional(Target::CardImage),
            url: required(Target::CardUrl)?,
            category: optional(Target::CardCategory),
        })
    }

    fn compile(&self) -> Result<CompiledCard, ScraperError> {
        Ok(CompiledCard {
            grid: compile(&self.grid)?,
            card: compile(&self.card)?,
            name: compile(&self.name)?,
            brand: compile(&self.brand)?,
            price: compile(&self.price)?,
            details: compile(&self.details)?,
            image: compile(&self.image)?,
            url: compile(&self.url)?,
            category: compile(&self.category)?,
        })
    }
}

struct CompiledCard {
    grid: Vec<Selector>,
    card: Vec<Selector>,
    name: Vec<Selector>,
    brand: Vec<Selector>,
    price: Vec<Selector>,
    details: Vec<Selector>,
    image: Vec<Selector>,
    url: Vec<Selector>,
    category: Vec<Selector>,
}

/// Lists products for the first `category_limit` categories, in order.
///
/// Each category URL gets the in-stock filter appended and is given
/// `page_settle_delay_ms` to render before the cards are read. A category
/// whose product grid never appears contributes nothing once the retry
/// budget is spent.
///
/// # Errors
///
/// Only configuration problems are fatal: a required card selector missing
/// from the registry or failing to compile.
pub async fn list_products<S: PageSession>(
    session: &mut S,
    registry: &SelectorRegistry,
    config: &AppConfig,
    retry: &mut RetryState,
    categories: &[CategoryLink],
) -> Result<Vec<ProductSummary>, ScraperError> {
    let selectors = CardSelectors::resolve(registry)?;
    let limit = categories.len().min(config.category_limit);
    let mut products = Vec::new();

    for category in &categories[..limit] {
        let listed = list_category(session, &selectors, config, retry, category).await?;
        tracing::info!(category = %category.url, count = listed.len(), "category listed");
        products.extend(listed);
    }

    tracing::info!(categories = limit, products = products.len(), "product listing complete");
    Ok(products)
}

async fn list_category<S: PageSession>(
    session: &mut S,
    selectors: &CardSelectors<'_>,
    config: &AppConfig,
    retry: &mut RetryState,
    category: &CategoryLink,
) -> Result<Vec<ProductSummary>, ScraperError> {
    let Some(url) = resolve_url(&config.base_url, &category.url)
        .map(with_stock_filter)
        .map(String::from)
    else {
        tracing::warn!(href = %category.url, "unresolvable category href, skipping");
        return Ok(Vec::new());
    };
    let kind = RetryKind::ProductSelectorMiss;
    retry.reset(kind);

    loop {
        let reason = match load_html(session, &url, config.page_settle_delay()).await {
            Ok(html) => match extract_listing(&html, selectors, &category.url)? {
                Some(products) => {
                    retry.reset(kind);
                    return Ok(products);
                }
                None => "product grid not found".to_string(),
            },
            Err(err) => err.to_string(),
        };

        let attempt = retry.failures(kind) + 1;
        if !retry.record_failure(kind) {
            tracing::warn!(url = %url, attempt, reason = %reason, "listing exhausted retries; category skipped");
            retry.reset(kind);
            return Ok(Vec::new());
        }
        tracing::warn!(url = %url, attempt, reason = %reason, "listing miss; retrying");
        tokio::time::sleep(config.selector_retry_delay()).await;
    }
}

/// Reads every card under the product grid.
///
/// `None` means the grid itself is missing. A present grid with no cards
/// is an empty listing.
fn extract_listing(
    html: &str,
    selectors: &CardSelectors<'_>,
    scraped_from: &str,
) -> Result<Option<Vec<ProductSummary>>, ScraperError> {
    let compiled = selectors.compile()?;
    let doc = Html::parse_document(html);

    let Some(grid) = compiled.grid.iter().find_map(|sel| doc.select(sel).next()) else {
        return Ok(None);
    };
    let cards: Vec<ElementRef<'_>> = compiled
        .card
        .iter()
        .map(|sel| grid.select(sel).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default();

    let mut products = Vec::with_capacity(cards.len());
    for (index, card) in cards.into_iter().enumerate() {
        match read_card(card, &compiled, scraped_from) {
            Ok(product) => products.push(product),
            Err(reason) => {
                tracing::warn!(category = scraped_from, index, reason = %reason, "product card skipped");
            }
        }
    }
    Ok(Some(products))
}

fn read_card(
    card: ElementRef<'_>,
    compiled: &CompiledCard,
    scraped_from: &str,
) -> Result<ProductSummary, String> {
    let name = first_text(card, &compiled.name).ok_or("missing product name")?;
    let raw_price = first_text(card, &compiled.price).ok_or("missing price")?;
    let price = parse_price(&raw_price).ok_or_else(|| format!("malformed price {raw_price:?}"))?;
    let url = first_attr(card, &compiled.url, "href");

    Ok(ProductSummary {
        id: url.as_deref().and_then(derive_product_id),
        brand: first_text(card, &compiled.brand).unwrap_or_default(),
        name,
        details: first_text(card, &compiled.details),
        price,
        image_url: first_attr(card, &compiled.image, "src"),
        url,
        category: first_text(card, &compiled.category).unwrap_or_default(),
        category_url: first_attr(card, &compiled.category, "href"),
        scraped_from_category: scraped_from.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn fallback_card() -> &'static str {
        r#"<article>
            <a class="sc-a1453065-0 iqBVXt" href="/fr/s1/product/case-77001234"><img src="/img/case.jpg"></a>
            <p class="sc-2e9036-0 cNsIaf"><strong>Spigen</strong> <span>Rugged Armor</span></p>
            <span class="sc-3ffcdfc9-1 cHHHJV">CHF 24,90</span>
            <p class="sc-b3dc936d-9 BunLw">iPhone 15, TPU</p>
            <a class="sc-ccd25b80-0 beNCEW sc-ce74e31a-6 fJUqGN" href="/fr/s1/producttype/case-81">Cases</a>
        </article>"#
    }

    #[test]
    fn extract_listing_reads_fallback_markup() {
        let registry = SelectorRegistry::builtin();
        let selectors = CardSelectors::resolve(&registry).unwrap();
        let html = format!(
            r#"<html><body><div class="sc-cf3a75ab-0 gVYcPP">{}</div></body></html>"#,
            fallback_card()
        );

        let products = extract_listing(&html, &selectors, "/fr/s1/producttype/case-81")
            .unwrap()
            .expect("fallback grid is found");
        assert_eq!(products.len(), 1);
        let p = &products[0];
        assert_eq!(p.name, "Rugged Armor");
        assert_eq!(p.brand, "Spigen");
        assert_eq!(p.price, Decimal::new(2490, 2));
        assert_eq!(p.id.as_deref(), Some("77001234"));
        assert_eq!(p.details.as_deref(), Some("iPhone 15, TPU"));
        assert_eq!(p.image_url.as_deref(), Some("/img/case.jpg"));
        assert_eq!(p.category, "Cases");
        assert_eq!(p.category_url.as_deref(), Some("/fr/s1/producttype/case-81"));
    }

    #[test]
    fn extract_listing_without_grid_is_a_miss() {
        let registry = SelectorRegistry::builtin();
        let selectors = CardSelectors::resolve(&registry).unwrap();
        let html = format!("<html><body><section>{}</section></body></html>", fallback_card());
        assert!(extract_listing(&html, &selectors, "/c").unwrap().is_none());
    }

    #[test]
    fn extract_listing_with_empty_grid_is_empty() {
        let registry = SelectorRegistry::builtin();
        let selectors = CardSelectors::resolve(&registry).unwrap();
        let html = r#"<html><body><div class="sc-5d2f6f43-1 jwLEDS"></div></body></html>"#;
        let products = extract_listing(html, &selectors, "/c").unwrap().unwrap();
        assert!(products.is_empty());
    }

    #[test]
    fn resolve_reports_missing_required_selector() {
        let mut registry = SelectorRegistry::builtin();
        registry.selectors.retain(|e| e.target != Target::CardPrice);
        let err = CardSelectors::resolve(&registry).unwrap_err();
        assert!(matches!(
            err,
            ScraperError::MissingSelector {
                target: Target::CardPrice,
                stage: Stage::Listing
            }
        ));
    }
}
