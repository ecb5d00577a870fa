use crate::models::{Interaction, ItemId, ListBuilder, RecommendationList};
use std::collections::HashMap;
use std::sync::Arc;

/// Global Popularity Ranking - overall popularity
/// Items ordered by interaction count (desc), ties by item id (asc).
/// Serves cold-start users and fills sparse contexts.
#[derive(Debug, Clone, Default)]
pub struct GlobalPopularityRanking {
    ranked: Vec<ItemId>,
    counts: HashMap<ItemId, usize>,
    positions: HashMap<ItemId, usize>,
}

impl GlobalPopularityRanking {
    pub fn build<'a, I>(interactions: I) -> Self
    where
        I: IntoIterator<Item = &'a Interaction>,
    {
        let mut counts: HashMap<ItemId, usize> = HashMap::new();
        for interaction in interactions {
            *counts.entry(interaction.item_id.clone()).or_insert(0) += 1;
        }

        let mut ranked: Vec<ItemId> = counts.keys().cloned().collect();
        ranked.sort_by(|a, b| counts[b].cmp(&counts[a]).then_with(|| a.cmp(b)));

        let positions = ranked
            .iter()
            .enumerate()
            .map(|(rank, item)| (item.clone(), rank))
            .collect();

        Self {
            ranked,
            counts,
            positions,
        }
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn ranked(&self) -> &[ItemId] {
        &self.ranked
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemId> {
        self.ranked.iter()
    }

    pub fn count(&self, item_id: &str) -> usize {
        self.counts.get(item_id).copied().unwrap_or(0)
    }

    /// 0-indexed position, `None` for items never seen in training
    pub fn rank_of(&self, item_id: &str) -> Option<usize> {
        self.positions.get(item_id).copied()
    }

    pub fn is_within_top(&self, item_id: &str, k: usize) -> bool {
        self.rank_of(item_id).map_or(false, |rank| rank < k)
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.positions.contains_key(item_id)
    }

    pub fn top(&self, n: usize) -> RecommendationList {
        let mut builder = ListBuilder::new(n);
        builder.extend(&self.ranked);
        builder.finish()
    }
}

/// Read-only item metadata shared with the integration module
#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    pub popularity: Arc<GlobalPopularityRanking>,
    pub categories: Arc<HashMap<ItemId, String>>,
}

impl ItemCatalog {
    pub fn build<'a, I>(interactions: I) -> Self
    where
        I: IntoIterator<Item = &'a Interaction> + Clone,
    {
        let mut categories: HashMap<ItemId, String> = HashMap::new();
        for interaction in interactions.clone() {
            if let Some(category) = &interaction.category {
                categories
                    .entry(interaction.item_id.clone())
                    .or_insert_with(|| category.clone());
            }
        }

        Self {
            popularity: Arc::new(GlobalPopularityRanking::build(interactions)),
            categories: Arc::new(categories),
        }
    }

    pub fn category(&self, item_id: &str) -> Option<&str> {
        self.categories.get(item_id).map(String::as_str)
    }
}
