//! Marketplace set inventory page scraping
//!
//! Pulls `(item id, name)` pairs for minifig rows out of the HTML inventory
//! page. Each table row links to `catalogitem.page?M=<id>` and carries the
//! display name in bold. Markup changes upstream break this first, so the
//! parser is covered by a golden test against a saved page.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::sources::InventoryRow;

static ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("row regex"));
static ITEM_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)catalogitem\.page\?M=([^"'&>\s]+)"#).expect("item link regex"));
static BOLD_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<b>(.*?)</b>").expect("bold regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));
static NUMERIC_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#(x?)([0-9a-fA-F]+);").expect("entity regex"));

/// Parse every minifig row, first occurrence of an id wins
pub fn parse_inventory_rows(html: &str) -> Vec<InventoryRow> {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for row in ROW.captures_iter(html) {
        let body = &row[1];

        let Some(item_id) = ITEM_LINK.captures(body).map(|c| c[1].to_string()) else {
            continue;
        };
        let Some(raw_name) = BOLD_NAME.captures(body).map(|c| c[1].to_string()) else {
            continue;
        };

        let name = clean_text(&raw_name);
        if name.is_empty() || !seen.insert(item_id.clone()) {
            continue;
        }

        rows.push(InventoryRow { item_id, name });
    }

    rows
}

fn clean_text(fragment: &str) -> String {
    let stripped = TAG.replace_all(fragment, "");
    let decoded = decode_entities(&stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    let numeric = NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures| {
        let radix = if caps[1].is_empty() { 10 } else { 16 };
        u32::from_str_radix(&caps[2], radix)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    numeric
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
