//! String helpers for values read off listing and product pages.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use url::Url;

/// Query appended to every category URL so listings only show in-stock items,
/// sorted by availability.
pub const STOCK_FILTER: &str = "filter=t_off%3DInStock&so=15";

static FIRST_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Parses a localized price string such as `"CHF 1'299,90"` or `"19.–"`.
///
/// Strips the `CHF` currency token and Swiss thousands separators, turns a
/// decimal comma into a point, and drops a trailing dash used for whole
/// francs. Returns `None` when what remains is not a plain decimal.
#[must_use]
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let mut s = raw.replace("CHF", "");
    s.retain(|c| !matches!(c, '\'' | '\u{2019}') && !c.is_whitespace());
    let s = s
        .trim_end_matches(['\u{2013}', '-'])
        .trim_end_matches('.')
        .replace(',', ".");
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(&s).ok()
}

/// First run of ASCII digits in `text`, e.g. `12` from `"12 items in stock"`.
#[must_use]
pub fn first_integer(text: &str) -> Option<u32> {
    FIRST_INTEGER
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
}

/// Resolves an extracted href against the site origin.
///
/// Relative hrefs are joined the way a browser would (`./` and `../`
/// segments are normalized). Absolute hrefs are kept and protocol-relative
/// ones take the base scheme. `None` if the base or the href is not a URL.
#[must_use]
pub fn resolve_url(base_url: &str, href: &str) -> Option<Url> {
    let base = Url::parse(base_url).ok()?;
    base.join(href).ok()
}

/// Appends [`STOCK_FILTER`] to the query of `url`, keeping any existing
/// query parameters and fragment.
#[must_use]
pub fn with_stock_filter(mut url: Url) -> Url {
    let query = match url.query().filter(|q| !q.is_empty()) {
        Some(existing) => format!("{existing}&{STOCK_FILTER}"),
        None => STOCK_FILTER.to_string(),
    };
    url.set_query(Some(&query));
    url
}

/// Collapses runs of whitespace to single spaces and trims the ends.
#[must_use]
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(units: i64, scale: u32) -> Decimal {
        Decimal::new(units, scale)
    }

    #[test]
    fn parse_price_accepts_normalized_input() {
        assert_eq!(parse_price("19.90"), Some(dec(1990, 2)));
    }

    #[test]
    fn parse_price_strips_currency_and_comma() {
        assert_eq!(parse_price("CHF 19,90"), Some(dec(1990, 2)));
        assert_eq!(parse_price("19,90 CHF"), Some(dec(1990, 2)));
    }

    #[test]
    fn parse_price_tolerates_swiss_thousands_separators() {
        assert_eq!(parse_price("CHF 1'299.00"), Some(dec(1299, 0)));
        assert_eq!(parse_price("CHF 1\u{2019}299.00"), Some(dec(1299, 0)));
        assert_eq!(parse_price("2\u{202f}499,50"), Some(dec(249_950, 2)));
    }

    #[test]
    fn parse_price_handles_whole_franc_dash() {
        assert_eq!(parse_price("CHF 49.\u{2013}"), Some(dec(49, 0)));
        assert_eq!(parse_price("49.-"), Some(dec(49, 0)));
    }

    #[test]
    fn parse_price_rejects_garbage() {
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("CHF"), None);
        assert_eq!(parse_price("Preis auf Anfrage"), None);
        assert_eq!(parse_price("1,299.00"), None);
    }

    #[test]
    fn first_integer_reads_leading_count() {
        assert_eq!(first_integer("12 items in stock"), Some(12));
        assert_eq!(first_integer("More than 10 items"), Some(10));
        assert_eq!(first_integer("Out of stock"), None);
    }

    fn resolved(base: &str, href: &str) -> String {
        resolve_url(base, href).map(String::from).unwrap_or_default()
    }

    fn filtered(url: &str) -> String {
        with_stock_filter(Url::parse(url).unwrap()).into()
    }

    #[test]
    fn resolve_url_joins_relative_paths() {
        assert_eq!(
            resolved("https://www.galaxus.ch/", "/fr/s1/producttype/notebook-6"),
            "https://www.galaxus.ch/fr/s1/producttype/notebook-6"
        );
        assert_eq!(
            resolved("https://www.galaxus.ch", "fr/s1/product/x-1"),
            "https://www.galaxus.ch/fr/s1/product/x-1"
        );
    }

    #[test]
    fn resolve_url_normalizes_dot_segments() {
        assert_eq!(
            resolved("https://shop.test", "./c/phones-24"),
            "https://shop.test/c/phones-24"
        );
        assert_eq!(
            resolved("https://shop.test", "../c/phones-24"),
            "https://shop.test/c/phones-24"
        );
    }

    #[test]
    fn resolve_url_keeps_absolute_hrefs() {
        assert_eq!(
            resolved("https://www.galaxus.ch", "https://other.test/a"),
            "https://other.test/a"
        );
        assert_eq!(
            resolved("https://www.galaxus.ch", "//cdn.test/img.jpg"),
            "https://cdn.test/img.jpg"
        );
    }

    #[test]
    fn resolve_url_rejects_invalid_base() {
        assert!(resolve_url("not a url", "/c/phones-24").is_none());
    }

    #[test]
    fn with_stock_filter_extends_the_query() {
        assert_eq!(
            filtered("https://shop.test/c/laptops-1"),
            "https://shop.test/c/laptops-1?filter=t_off%3DInStock&so=15"
        );
        assert_eq!(
            filtered("https://shop.test/c/laptops-1?tagIds=7"),
            "https://shop.test/c/laptops-1?tagIds=7&filter=t_off%3DInStock&so=15"
        );
    }

    #[test]
    fn with_stock_filter_keeps_fragment_last() {
        assert_eq!(
            filtered("https://shop.test/c/phones-24#top"),
            "https://shop.test/c/phones-24?filter=t_off%3DInStock&so=15#top"
        );
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Apple\n   iPhone 15 \t"), "Apple iPhone 15");
    }
}
