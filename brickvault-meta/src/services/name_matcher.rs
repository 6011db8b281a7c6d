//! Fuzzy name matching for marketplace id resolution
//!
//! Scoring is pluggable through [`NameScorer`]; [`best_match`] normalizes
//! both sides and keeps the highest-scoring candidate.

use once_cell::sync::Lazy;
use regex::Regex;

use super::sources::InventoryRow;

static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\- ]").expect("disallowed chars regex"));

/// Similarity between two normalized names, in `0.0..=1.0`
pub trait NameScorer: Send + Sync {
    fn score(&self, target: &str, candidate: &str) -> f64;
}

/// Jaro-Winkler similarity (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinklerScorer;

impl NameScorer for JaroWinklerScorer {
    fn score(&self, target: &str, candidate: &str) -> f64 {
        strsim::jaro_winkler(target, candidate)
    }
}

/// Normalized Levenshtein similarity
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenshteinScorer;

impl NameScorer for LevenshteinScorer {
    fn score(&self, target: &str, candidate: &str) -> f64 {
        strsim::normalized_levenshtein(target, candidate)
    }
}

/// Lowercase, strip punctuation, collapse whitespace, `" - "` → `"-"`
pub fn normalize_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    // Strip before collapsing so removed punctuation leaves no double spaces
    let stripped = DISALLOWED.replace_all(&lowered, "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.replace(" - ", "-")
}

/// Matched candidate with its score
#[derive(Debug, Clone, PartialEq)]
pub struct NameMatch<'a> {
    pub row: &'a InventoryRow,
    pub score: f64,
}

/// Best-scoring candidate; ties keep the earliest row
///
/// Returns `None` only when there are no candidates or nothing scores
/// above zero.
pub fn best_match<'a>(scorer: &dyn NameScorer, target: &str, candidates: &'a [InventoryRow]) -> Option<NameMatch<'a>> {
    let target = normalize_name(target);

    candidates
        .iter()
        .map(|row| NameMatch {
            row,
            score: scorer.score(&target, &normalize_name(&row.name)),
        })
        .filter(|m| m.score > 0.0)
        .fold(None, |best: Option<NameMatch<'a>>, m| match best {
            Some(b) if b.score >= m.score => Some(b),
            _ => Some(m),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, name: &str) -> InventoryRow {
        InventoryRow {
            item_id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Luke   Skywalker (Tatooine) "), "luke skywalker tatooine");
        assert_eq!(normalize_name("Clone Trooper - Phase 2"), "clone trooper-phase 2");
        assert_eq!(normalize_name("R2-D2!"), "r2-d2");
        assert_eq!(normalize_name("Luke  -  (Hoth)"), "luke-hoth");
    }

    #[test]
    fn test_best_match_picks_closest_name() {
        let rows = vec![
            row("sw0002", "Han Solo (Hoth)"),
            row("sw0001a", "Luke Skywalker (Tatooine)"),
            row("sw0003", "Princess Leia"),
        ];

        let found = best_match(&JaroWinklerScorer, "Luke Skywalker - Tatooine", &rows).unwrap();
        assert_eq!(found.row.item_id, "sw0001a");

        let found = best_match(&LevenshteinScorer, "Luke Skywalker - Tatooine", &rows).unwrap();
        assert_eq!(found.row.item_id, "sw0001a");
    }

    #[test]
    fn test_best_match_empty_candidates() {
        assert!(best_match(&JaroWinklerScorer, "Luke", &[]).is_none());
    }

    struct FirstLetter;

    impl NameScorer for FirstLetter {
        fn score(&self, target: &str, candidate: &str) -> f64 {
            if target.chars().next() == candidate.chars().next() {
                1.0
            } else {
                0.0
            }
        }
    }

    #[test]
    fn test_custom_scorer_and_tie_keeps_first() {
        let rows = vec![row("a", "Leia"), row("b", "Lando"), row("c", "Han")];
        let found = best_match(&FirstLetter, "Luke", &rows).unwrap();
        assert_eq!(found.row.item_id, "a");
    }
}
