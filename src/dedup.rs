use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::types::DUPLICATE_PAGE_COUNT_THRESHOLD;

const PARAM_PLACEHOLDER: &str = ":param";

/// Collapse numeric path segments into a placeholder and append the query,
/// so `/orders/17/items/9` and `/orders/3/items/4` share one shape.
pub fn normalize_page(url: &Url) -> String {
    let path = url
        .path()
        .split('/')
        .map(|part| if is_numeric(part) { PARAM_PLACEHOLDER } else { part })
        .collect::<Vec<_>>()
        .join("/");

    match url.query() {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path,
    }
}

/// A segment counts as numeric if it is a signed decimal with an optional
/// exponent, a signed `Infinity`, or an unsigned `0x`/`0o`/`0b` literal.
/// Surrounding whitespace is ignored and a blank segment reads as zero.
static NUMBER_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[+-]?(?:Infinity|(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?)|0[xX][0-9a-fA-F]+|0[oO][0-7]+|0[bB][01]+)?$",
    )
    .expect("valid number literal pattern")
});

fn is_numeric(part: &str) -> bool {
    let trimmed = part.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    !part.is_empty() && NUMBER_LITERAL.is_match(trimmed)
}

/// Caps how often one page shape may be enqueued.
#[derive(Debug, Default)]
pub struct PageDeduplicator {
    counts: HashMap<String, usize>,
}

impl PageDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a sighting of `url`. Returns true while the shape has been seen
    /// fewer than three times before this call.
    pub fn record_page(&mut self, url: &Url) -> bool {
        let count = self.counts.entry(normalize_page(url)).or_insert(0);
        let admitted = *count < DUPLICATE_PAGE_COUNT_THRESHOLD;
        *count += 1;
        admitted
    }

    pub fn count(&self, url: &Url) -> usize {
        self.counts.get(&normalize_page(url)).copied().unwrap_or(0)
    }
}
