//! Golden test for the set inventory scraper
//!
//! The fixture is a saved inventory page. When the upstream markup changes,
//! refresh the fixture and expect this test to fail first.

use brickvault_meta::services::inventory_parser::parse_inventory_rows;
use brickvault_meta::services::{best_match, JaroWinklerScorer, LevenshteinScorer};

const FIXTURE: &str = include_str!("fixtures/bricklink_set_inventory.html");

#[test]
fn test_fixture_rows() {
    let rows = parse_inventory_rows(FIXTURE);
    let parsed: Vec<(&str, &str)> = rows.iter().map(|r| (r.item_id.as_str(), r.name.as_str())).collect();

    assert_eq!(
        parsed,
        vec![
            ("sw0399", "X-wing Pilot (Biggs Darklighter)"),
            ("sw0398", "R2-Q5 & Astromech Droid"),
            ("sw0335", "Luke Skywalker - Pilot's Dagobah Outfit"),
        ]
    );
}

#[test]
fn test_fixture_skips_headers_parts_and_unnamed_rows() {
    let rows = parse_inventory_rows(FIXTURE);
    assert!(rows.iter().all(|r| r.item_id.starts_with("sw")));
    assert!(!rows.iter().any(|r| r.item_id == "sw0400"));
    assert!(!rows.iter().any(|r| r.name.contains("spare")));
}

#[test]
fn test_catalog_name_matches_fixture_row() {
    let rows = parse_inventory_rows(FIXTURE);

    for scorer in [&JaroWinklerScorer as &dyn brickvault_meta::services::NameScorer, &LevenshteinScorer] {
        let matched = best_match(scorer, "Luke Skywalker (Dagobah Pilot Outfit)", &rows).unwrap();
        assert_eq!(matched.row.item_id, "sw0335");
    }
}

#[test]
fn test_empty_page_yields_no_rows() {
    assert!(parse_inventory_rows("<html><body>No Item(s) were found.</body></html>").is_empty());
}
