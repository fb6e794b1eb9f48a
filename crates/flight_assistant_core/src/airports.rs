//! Static airport code to city name lookup.

use std::sync::LazyLock;

use regex::Regex;

/// Known airports, in lookup order.
pub const AIRPORT_CITIES: &[(&str, &str)] = &[
    ("CNS", "Cairns"),
    ("AKL", "Auckland"),
    ("SYD", "Sydney"),
    ("GOV", "Nhulunbuy"),
    ("DUD", "Dunedin"),
    ("DRW", "Darwin"),
    ("BNE", "Brisbane"),
    ("MEL", "Melbourne"),
    ("PER", "Perth"),
    ("CHC", "Christchurch"),
    ("WLG", "Wellington"),
    ("ZQN", "Queenstown"),
];

static CITY_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    AIRPORT_CITIES
        .iter()
        .filter_map(|(code, city)| {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(city)))
                .ok()
                .map(|re| (*code, re))
        })
        .collect()
});

pub fn city_for_code(code: &str) -> Option<&'static str> {
    AIRPORT_CITIES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(code))
        .map(|(_, city)| *city)
}

/// The city name for a known code, otherwise the code itself.
pub fn display_name(code: &str) -> &str {
    city_for_code(code).unwrap_or(code)
}

/// Finds the first known city named in `query` and returns its airport code.
///
/// Matching is case-insensitive on whole words. When several cities appear,
/// the one listed first in [`AIRPORT_CITIES`] wins.
pub fn code_for_city_in(query: &str) -> Option<&'static str> {
    CITY_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(query))
        .map(|(code, _)| *code)
}
