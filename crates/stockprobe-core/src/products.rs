use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Minimum on-hand unit count for a product to qualify as available.
pub const MIN_STOCK_LEVEL: u32 = 10;

/// Length of the identity prefix taken from a product URL's trailing slug.
const PRODUCT_ID_LEN: usize = 8;

/// One node of the retailer's category graph. Identity is `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLink {
    pub name: String,
    /// Path-relative href exactly as extracted, e.g. `"/fr/s1/producttype/notebook-6"`.
    pub url: String,
}

/// A product card read from a category listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    /// Derived from `url` by [`derive_product_id`]; `None` when `url` is absent.
    pub id: Option<String>,
    pub brand: String,
    pub name: String,
    pub details: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub image_url: Option<String>,
    pub url: Option<String>,
    /// Category label printed on the card itself.
    pub category: String,
    pub category_url: Option<String>,
    /// The category URL this card was listed under.
    pub scraped_from_category: String,
}

impl ProductSummary {
    /// Short label for log lines: the derived id, or `"<no-id>"`.
    #[must_use]
    pub fn log_id(&self) -> &str {
        self.id.as_deref().unwrap_or("<no-id>")
    }
}

/// A product that passed the availability threshold.
///
/// Only constructible through [`StockRecord::qualify`], so every value
/// satisfies `stock_level >= MIN_STOCK_LEVEL` with pickup available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockRecord {
    #[serde(flatten)]
    product: ProductSummary,
    stock_level: u32,
    pickup_available: bool,
}

impl StockRecord {
    /// Returns a record when `stock_level` meets [`MIN_STOCK_LEVEL`] and at
    /// least one pickup location was listed, `None` otherwise.
    #[must_use]
    pub fn qualify(product: ProductSummary, stock_level: u32, pickup_locations: usize) -> Option<Self> {
        (stock_level >= MIN_STOCK_LEVEL && pickup_locations > 0).then_some(Self {
            product,
            stock_level,
            pickup_available: true,
        })
    }

    #[must_use]
    pub fn product(&self) -> &ProductSummary {
        &self.product
    }

    #[must_use]
    pub fn stock_level(&self) -> u32 {
        self.stock_level
    }

    #[must_use]
    pub fn pickup_available(&self) -> bool {
        self.pickup_available
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.product.url.as_deref()
    }
}

/// Derives the stable product id from a product URL.
///
/// Takes the last path segment, keeps what follows its final `-` (the
/// numeric slug), and truncates to 8 characters. Returns `None` for an
/// empty URL or one whose trailing slug is empty.
#[must_use]
pub fn derive_product_id(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    let slug = segment.rsplit('-').next()?;
    if slug.is_empty() {
        return None;
    }
    Some(slug.chars().take(PRODUCT_ID_LEN).collect())
}

/// Removes later duplicates by `key`, keeping the first-seen item.
///
/// Items whose key is `None` cannot be compared and are always kept.
pub fn dedup_by_url<T, F>(items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> Option<&str>,
{
    let mut seen: HashSet<String> = HashSet::new();
    items
        .into_iter()
        .filter(|item| match key(item) {
            Some(url) => seen.insert(url.to_owned()),
            None => true,
        })
        .collect()
}
