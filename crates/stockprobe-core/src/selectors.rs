//! Versioned selector table for the retailer's markup.
//!
//! The site ships generated class names that differ between the landing page
//! and nested listing pages, so every selector is keyed by the stage that
//! uses it and the page level it applies to. Site-specific corrections live
//! in the same table under a name so they can be audited and tested.
//!
//! ```yaml
//! version: 3
//! selectors:
//!   - target: category_link
//!     stage: categories
//!     min_level: 0
//!     max_level: 0
//!     primary: "div.sc-e8cbc69d-0.dKMQVj a"
//! corrections:
//!   - name: landing_promotional_links
//!     stage: categories
//!     level: 0
//!     drop_trailing: 2
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Categories,
    Listing,
    Probe,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Categories => write!(f, "categories"),
            Stage::Listing => write!(f, "listing"),
            Stage::Probe => write!(f, "probe"),
        }
    }
}

/// What a selector extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    CategoryLink,
    /// Listing container; its absence means the markup drifted.
    ProductGrid,
    /// One card inside the grid.
    ProductCard,
    CardName,
    CardBrand,
    CardPrice,
    CardDetails,
    CardImage,
    CardUrl,
    CardCategory,
    AvailabilityTrigger,
    AvailabilityOverlay,
    StockLine,
    PickupLocation,
    OverlayClose,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Target::CategoryLink => "category_link",
            Target::ProductGrid => "product_grid",
            Target::ProductCard => "product_card",
            Target::CardName => "card_name",
            Target::CardBrand => "card_brand",
            Target::CardPrice => "card_price",
            Target::CardDetails => "card_details",
            Target::CardImage => "card_image",
            Target::CardUrl => "card_url",
            Target::CardCategory => "card_category",
            Target::AvailabilityTrigger => "availability_trigger",
            Target::AvailabilityOverlay => "availability_overlay",
            Target::StockLine => "stock_line",
            Target::PickupLocation => "pickup_location",
            Target::OverlayClose => "overlay_close",
        };
        f.write_str(name)
    }
}

/// The semantic context a lookup is made in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectorContext {
    pub stage: Stage,
    /// Page level: 0 for the landing page, 1+ for nested pages.
    pub level: u32,
}

impl SelectorContext {
    #[must_use]
    pub const fn new(stage: Stage, level: u32) -> Self {
        Self { stage, level }
    }
}

/// Primary selector plus one optional fallback, resolved for a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorSet<'a> {
    pub primary: &'a str,
    pub fallback: Option<&'a str>,
}

impl<'a> SelectorSet<'a> {
    /// Primary first, then the fallback if one is configured.
    pub fn candidates(&self) -> impl Iterator<Item = &'a str> {
        std::iter::once(self.primary).chain(self.fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorEntry {
    pub target: Target,
    pub stage: Stage,
    #[serde(default)]
    pub min_level: u32,
    /// Inclusive upper bound; `None` applies to every deeper level.
    #[serde(default)]
    pub max_level: Option<u32>,
    pub primary: String,
    #[serde(default)]
    pub fallback: Option<String>,
}

impl SelectorEntry {
    fn covers(&self, level: u32) -> bool {
        level >= self.min_level && self.max_level.is_none_or(|max| level <= max)
    }

    fn overlaps(&self, other: &SelectorEntry) -> bool {
        let self_max = self.max_level.unwrap_or(u32::MAX);
        let other_max = other.max_level.unwrap_or(u32::MAX);
        self.min_level <= other_max && other.min_level <= self_max
    }
}

/// A named, site-specific adjustment applied to extracted results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteCorrection {
    pub name: String,
    pub stage: Stage,
    pub level: u32,
    /// Number of entries removed from the end of the extracted list.
    pub drop_trailing: usize,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorRegistry {
    pub version: u32,
    pub selectors: Vec<SelectorEntry>,
    #[serde(default)]
    pub corrections: Vec<SiteCorrection>,
}

/// `(stage, target, level)` triples every registry must resolve.
const REQUIRED: &[(Stage, Target, u32)] = &[
    (Stage::Categories, Target::CategoryLink, 0),
    (Stage::Categories, Target::CategoryLink, 1),
    (Stage::Listing, Target::ProductGrid, 0),
    (Stage::Listing, Target::ProductCard, 0),
    (Stage::Listing, Target::CardName, 0),
    (Stage::Listing, Target::CardPrice, 0),
    (Stage::Listing, Target::CardUrl, 0),
    (Stage::Probe, Target::AvailabilityTrigger, 0),
    (Stage::Probe, Target::AvailabilityOverlay, 0),
    (Stage::Probe, Target::StockLine, 0),
    (Stage::Probe, Target::PickupLocation, 0),
];

impl SelectorRegistry {
    /// The table for the retailer's markup as of the current site release.
    #[must_use]
    pub fn builtin() -> Self {
        fn entry(
            target: Target,
            stage: Stage,
            levels: (u32, Option<u32>),
            primary: &str,
            fallback: Option<&str>,
        ) -> SelectorEntry {
            SelectorEntry {
                target,
                stage,
                min_level: levels.0,
                max_level: levels.1,
                primary: primary.to_owned(),
                fallback: fallback.map(str::to_owned),
            }
        }

        let any = (0, None);
        Self {
            version: 3,
            selectors: vec![
                entry(
                    Target::CategoryLink,
                    Stage::Categories,
                    (0, Some(0)),
                    "div.sc-e8cbc69d-0.dKMQVj a",
                    None,
                ),
                entry(
                    Target::CategoryLink,
                    Stage::Categories,
                    (1, None),
                    "ul.sc-1656bbdd-0.gQqszz a",
                    None,
                ),
                entry(
                    Target::ProductGrid,
                    Stage::Listing,
                    any,
                    "div.sc-5d2f6f43-1.jwLEDS",
                    Some("div.sc-cf3a75ab-0.gVYcPP"),
                ),
                entry(Target::ProductCard, Stage::Listing, any, "article", None),
                entry(
                    Target::CardName,
                    Stage::Listing,
                    any,
                    "span.sc-6923aaa7-0.fkBRnq",
                    Some("p.sc-2e9036-0.cNsIaf span"),
                ),
                entry(
                    Target::CardBrand,
                    Stage::Listing,
                    any,
                    "strong",
                    Some("p.sc-2e9036-0.cNsIaf strong"),
                ),
                entry(
                    Target::CardPrice,
                    Stage::Listing,
                    any,
                    "span.sc-812f8453-1.fMoCQC",
                    Some("span.sc-3ffcdfc9-1.cHHHJV"),
                ),
                entry(
                    Target::CardDetails,
                    Stage::Listing,
                    any,
                    "p.sc-ce74e31a-9.gcbXXJ",
                    Some("p.sc-b3dc936d-9.BunLw"),
                ),
                entry(Target::CardImage, Stage::Listing, any, "img", None),
                entry(
                    Target::CardUrl,
                    Stage::Listing,
                    any,
                    "a.sc-b0fdbb10-0.iNiATr",
                    Some("a.sc-a1453065-0.iqBVXt"),
                ),
                entry(
                    Target::CardCategory,
                    Stage::Listing,
                    any,
                    "a.sc-ccd25b80-0.beNCEW.sc-430e9524-6.gSfbKC",
                    Some("a.sc-ccd25b80-0.beNCEW.sc-ce74e31a-6.fJUqGN"),
                ),
                entry(
                    Target::AvailabilityTrigger,
                    Stage::Probe,
                    any,
                    "button.sc-58bde996-0.bQTVcy",
                    None,
                ),
                entry(
                    Target::AvailabilityOverlay,
                    Stage::Probe,
                    any,
                    "div.sc-d0d34be1-2.dMCIvG",
                    None,
                ),
                entry(
                    Target::StockLine,
                    Stage::Probe,
                    any,
                    "div.sc-dbd9c505-1.fwiPKQ",
                    None,
                ),
                entry(Target::PickupLocation, Stage::Probe, any, "strong", None),
                entry(
                    Target::OverlayClose,
                    Stage::Probe,
                    any,
                    "button.sc-2f97377a-0.iDwhgK.sc-d0d34be1-3.fgYBWv",
                    None,
                ),
            ],
            corrections: vec![SiteCorrection {
                name: "landing_promotional_links".to_owned(),
                stage: Stage::Categories,
                level: 0,
                drop_trailing: 2,
                note: Some(
                    "the landing navigation ends with two promotional links that are not categories"
                        .to_owned(),
                ),
            }],
        }
    }

    /// Resolves the selectors for `target` in `ctx`, or `None` if the table
    /// has no entry covering that stage and level.
    #[must_use]
    pub fn selectors_for(&self, target: Target, ctx: SelectorContext) -> Option<SelectorSet<'_>> {
        self.selectors
            .iter()
            .find(|e| e.target == target && e.stage == ctx.stage && e.covers(ctx.level))
            .map(|e| SelectorSet {
                primary: e.primary.as_str(),
                fallback: e.fallback.as_deref(),
            })
    }

    /// Corrections that apply to results extracted in `ctx`.
    pub fn corrections_for(&self, ctx: SelectorContext) -> impl Iterator<Item = &SiteCorrection> {
        self.corrections
            .iter()
            .filter(move |c| c.stage == ctx.stage && c.level == ctx.level)
    }

    /// Checks the table is usable: positive version, no blank selectors, no
    /// overlapping level ranges for one target, every required target
    /// resolvable, and unique correction names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 {
            return Err(ConfigError::Validation(
                "selector table version must be positive".to_string(),
            ));
        }

        for (idx, entry) in self.selectors.iter().enumerate() {
            if entry.primary.trim().is_empty()
                || entry.fallback.as_deref().is_some_and(|f| f.trim().is_empty())
            {
                return Err(ConfigError::Validation(format!(
                    "{} selector for stage {} has an empty selector string",
                    entry.target, entry.stage
                )));
            }
            if entry.max_level.is_some_and(|max| max < entry.min_level) {
                return Err(ConfigError::Validation(format!(
                    "{} selector for stage {} has max_level below min_level",
                    entry.target, entry.stage
                )));
            }
            let clash = self.selectors[idx + 1..].iter().any(|other| {
                other.target == entry.target && other.stage == entry.stage && entry.overlaps(other)
            });
            if clash {
                return Err(ConfigError::Validation(format!(
                    "{} selectors for stage {} have overlapping level ranges",
                    entry.target, entry.stage
                )));
            }
        }

        for &(stage, target, level) in REQUIRED {
            if self
                .selectors_for(target, SelectorContext::new(stage, level))
                .is_none()
            {
                return Err(ConfigError::Validation(format!(
                    "no {target} selector for stage {stage} at level {level}"
                )));
            }
        }

        let mut seen = HashSet::new();
        for correction in &self.corrections {
            if !seen.insert(correction.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate correction name: '{}'",
                    correction.name
                )));
            }
        }

        Ok(())
    }
}

/// Load and validate a selector table from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_selector_registry(path: &Path) -> Result<SelectorRegistry, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SelectorsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let registry: SelectorRegistry =
        serde_yaml::from_str(&content).map_err(ConfigError::SelectorsFileParse)?;

    registry.validate()?;

    Ok(registry)
}
