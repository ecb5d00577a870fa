use crate::models::ScoredItem;
use crate::services::popularity::ItemCatalog;
use std::collections::HashSet;

/// Diversity Layer - 多樣性重排
/// Greedy re-rank over item categories: at every step the best remaining
/// candidate is picked, but a candidate whose category is already in the
/// list and whose inclusion would drop the unique-category ratio below
/// `diversity_factor` competes at a reduced score.
pub struct DiversityLayer {
    diversity_factor: f64,
    /// Score multiplier for candidates that would break the ratio
    repeat_penalty: f64,
}

impl DiversityLayer {
    pub fn new(diversity_factor: f64) -> Self {
        Self {
            diversity_factor,
            repeat_penalty: 0.3,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.diversity_factor > 0.0
    }

    /// Re-rank `items` (already sorted by relevance) and keep `top_k`.
    /// Items without a category count as unique.
    pub fn rerank(
        &self,
        items: Vec<ScoredItem>,
        top_k: usize,
        catalog: &ItemCatalog,
    ) -> Vec<ScoredItem> {
        if !self.is_enabled() {
            return items.into_iter().take(top_k).collect();
        }

        let mut selected: Vec<ScoredItem> = Vec::with_capacity(top_k.min(items.len()));
        let mut remaining = items;
        let mut seen_categories: HashSet<String> = HashSet::new();
        let mut unique = 0usize;

        while selected.len() < top_k && !remaining.is_empty() {
            let mut best_idx = 0;
            let mut best_score = f64::NEG_INFINITY;

            for (i, item) in remaining.iter().enumerate() {
                let penalty =
                    self.penalty(item, catalog, &seen_categories, unique, selected.len());
                let score = item.score * penalty;
                if score > best_score {
                    best_score = score;
                    best_idx = i;
                }
            }

            let chosen = remaining.remove(best_idx);
            match catalog.category(&chosen.item_id) {
                Some(category) => {
                    if seen_categories.insert(category.to_string()) {
                        unique += 1;
                    }
                }
                None => unique += 1,
            }
            selected.push(chosen);
        }

        selected
    }

    fn penalty(
        &self,
        item: &ScoredItem,
        catalog: &ItemCatalog,
        seen_categories: &HashSet<String>,
        unique: usize,
        selected: usize,
    ) -> f64 {
        let Some(category) = catalog.category(&item.item_id) else {
            return 1.0;
        };
        if !seen_categories.contains(category) {
            return 1.0;
        }

        // a repeated category leaves the unique count unchanged
        let ratio = unique as f64 / (selected + 1) as f64;
        if ratio < self.diversity_factor {
            self.repeat_penalty
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Interaction;
    use chrono::{TimeZone, Utc};

    fn catalog(categories: &[(&str, Option<&str>)]) -> ItemCatalog {
        let ts = Utc.with_ymd_and_hms(2023, 6, 15, 12, 0, 0).unwrap();
        let rows: Vec<Interaction> = categories
            .iter()
            .map(|(item, category)| {
                let row = Interaction::new("u", *item, 4.0, ts);
                match category {
                    Some(c) => row.with_category(*c),
                    None => row,
                }
            })
            .collect();
        ItemCatalog::build(&rows)
    }

    fn scored(items: &[(&str, f64)]) -> Vec<ScoredItem> {
        items
            .iter()
            .enumerate()
            .map(|(rank, (item, score))| ScoredItem {
                item_id: item.to_string(),
                score: *score,
                confidence: 0.0,
                confident: false,
                best_rank: rank,
            })
            .collect()
    }

    fn ids(items: &[ScoredItem]) -> Vec<&str> {
        items.iter().map(|i| i.item_id.as_str()).collect()
    }

    #[test]
    fn test_diversity_rerank_promotes_new_category() {
        let catalog = catalog(&[
            ("a", Some("Books")),
            ("b", Some("Books")),
            ("c", Some("Books")),
            ("d", Some("Home")),
        ]);
        let layer = DiversityLayer::new(0.9);

        let items = scored(&[("a", 1.0), ("b", 0.9), ("c", 0.8), ("d", 0.5)]);
        let reranked = layer.rerank(items, 3, &catalog);

        // "b" would give 1 unique of 2; 0.9 * 0.3 loses to "d"
        assert_eq!(ids(&reranked), vec!["a", "d", "b"]);
    }

    #[test]
    fn test_low_factor_keeps_relevance_order() {
        let catalog = catalog(&[("a", Some("Books")), ("b", Some("Books")), ("c", Some("Home"))]);
        let layer = DiversityLayer::new(0.2);

        let reranked = layer.rerank(scored(&[("a", 1.0), ("b", 0.9), ("c", 0.1)]), 3, &catalog);
        assert_eq!(ids(&reranked), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_uncategorised_items_count_as_unique() {
        let catalog = catalog(&[("a", None), ("b", None), ("c", Some("Home"))]);
        let layer = DiversityLayer::new(1.0);

        let reranked = layer.rerank(scored(&[("a", 1.0), ("b", 0.9), ("c", 0.1)]), 2, &catalog);
        assert_eq!(ids(&reranked), vec!["a", "b"]);
    }

    #[test]
    fn test_disabled_layer_truncates() {
        let catalog = catalog(&[("a", Some("Books")), ("b", Some("Books"))]);
        let layer = DiversityLayer::new(0.0);

        assert!(!layer.is_enabled());
        let reranked = layer.rerank(scored(&[("a", 1.0), ("b", 0.9)]), 1, &catalog);
        assert_eq!(ids(&reranked), vec!["a"]);
    }
}
