// Contextual index: time bucket → items ranked by in-bucket popularity.
//
// Order within a bucket:
// 1. in-bucket interaction count, descending
// 2. temporal_weight * (count / bucket total)
//    + activity_weight * mean engagement of the item's rows in the bucket
// 3. global popularity rank, then item id

use crate::config::{ContextConfig, ContextGranularity};
use crate::models::{ContextKey, EnrichedInteraction, ItemId};
use crate::services::features::TimeContext;
use crate::services::popularity::GlobalPopularityRanking;
use crate::utils::{cosine_similarity, desc_score};
use std::collections::{BTreeMap, HashMap};

/// Context key of a timestamp under the given granularity
pub fn context_key(granularity: ContextGranularity, time: &TimeContext) -> ContextKey {
    bucket_key(granularity, time.day_of_week, time.hour)
}

fn bucket_key(granularity: ContextGranularity, day_of_week: u8, hour: u8) -> ContextKey {
    match granularity {
        ContextGranularity::Hour => ContextKey::hourly(hour),
        ContextGranularity::DayOfWeekHour => ContextKey::weekly(day_of_week, hour),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBucket {
    ranked: Vec<ItemId>,
    counts: HashMap<ItemId, usize>,
    total: usize,
}

impl ContextBucket {
    pub fn ranked(&self) -> &[ItemId] {
        &self.ranked
    }

    pub fn count(&self, item_id: &str) -> usize {
        self.counts.get(item_id).copied().unwrap_or(0)
    }

    /// Number of interactions that fell into this bucket
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}

#[derive(Default)]
struct BucketItem {
    count: usize,
    engagement_sum: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextualIndex {
    buckets: BTreeMap<ContextKey, ContextBucket>,
}

impl ContextualIndex {
    pub fn build(
        rows: &[EnrichedInteraction],
        config: &ContextConfig,
        popularity: &GlobalPopularityRanking,
    ) -> Self {
        let mut grouped: BTreeMap<ContextKey, HashMap<&str, BucketItem>> = BTreeMap::new();

        for row in rows {
            let key = bucket_key(
                config.granularity,
                row.features.day_of_week,
                row.features.hour,
            );
            let item = grouped
                .entry(key)
                .or_default()
                .entry(row.interaction.item_id.as_str())
                .or_default();
            item.count += 1;
            item.engagement_sum += row.features.engagement_score;
        }

        let buckets = grouped
            .into_iter()
            .map(|(key, items)| (key, rank_bucket(items, config, popularity)))
            .collect();

        Self { buckets }
    }

    pub fn get(&self, key: &ContextKey) -> Option<&ContextBucket> {
        self.buckets.get(key)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Buckets whose item-count vectors have cosine similarity of at least
    /// `threshold` with `key`, most similar first. `key` itself is excluded.
    pub fn related(
        &self,
        key: &ContextKey,
        items: &[ItemId],
        threshold: f64,
    ) -> Vec<(ContextKey, f64)> {
        let Some(target) = self.buckets.get(key) else {
            return Vec::new();
        };
        let target_vector = count_vector(target, items);

        let mut related: Vec<(ContextKey, f64)> = self
            .buckets
            .iter()
            .filter(|(other, _)| *other != key)
            .map(|(other, bucket)| {
                let similarity = cosine_similarity(&target_vector, &count_vector(bucket, items));
                (*other, similarity)
            })
            .filter(|(_, similarity)| *similarity >= threshold)
            .collect();

        related.sort_by(|a, b| desc_score(a.1, b.1).then(a.0.cmp(&b.0)));
        related
    }
}

fn count_vector(bucket: &ContextBucket, items: &[ItemId]) -> Vec<f64> {
    items.iter().map(|item| bucket.count(item) as f64).collect()
}

fn rank_bucket(
    items: HashMap<&str, BucketItem>,
    config: &ContextConfig,
    popularity: &GlobalPopularityRanking,
) -> ContextBucket {
    let total: usize = items.values().map(|item| item.count).sum();
    let share = |count: usize| count as f64 / total.max(1) as f64;

    let mut scored: Vec<(&str, f64, usize)> = items
        .iter()
        .map(|(item_id, item)| {
            let mean_engagement = item.engagement_sum / item.count.max(1) as f64;
            let score = config.temporal_weight * share(item.count)
                + config.activity_weight * mean_engagement;
            (*item_id, score, item.count)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.2.cmp(&a.2)
            .then_with(|| desc_score(a.1, b.1))
            .then_with(|| {
                let rank_a = popularity.rank_of(a.0).unwrap_or(usize::MAX);
                let rank_b = popularity.rank_of(b.0).unwrap_or(usize::MAX);
                rank_a.cmp(&rank_b)
            })
            .then_with(|| a.0.cmp(b.0))
    });

    ContextBucket {
        ranked: scored.iter().map(|(item, _, _)| item.to_string()).collect(),
        counts: items
            .into_iter()
            .map(|(item, stats)| (item.to_string(), stats.count))
            .collect(),
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Interaction;
    use crate::services::features::{preprocess, RatingScale};
    use chrono::{TimeZone, Utc};

    fn rows(entries: &[(&str, u32, u32)]) -> Vec<EnrichedInteraction> {
        let data: Vec<Interaction> = entries
            .iter()
            .map(|(item, day, hour)| {
                let ts = Utc.with_ymd_and_hms(2023, 6, *day, *hour, 0, 0).unwrap();
                Interaction::new("u", *item, 4.0, ts)
            })
            .collect();
        preprocess(&data, RatingScale::default())
    }

    #[test]
    fn test_buckets_rank_by_share() {
        let enriched = rows(&[("a", 12, 8), ("a", 13, 8), ("b", 14, 8), ("c", 12, 22)]);
        let popularity = GlobalPopularityRanking::build(enriched.iter().map(|r| &r.interaction));
        let index = ContextualIndex::build(&enriched, &ContextConfig::default(), &popularity);

        assert_eq!(index.len(), 2);
        let morning = index.get(&ContextKey::hourly(8)).unwrap();
        assert_eq!(morning.ranked(), ["a", "b"]);
        assert_eq!(morning.total(), 3);
        assert_eq!(index.get(&ContextKey::hourly(22)).unwrap().ranked(), ["c"]);
        assert!(index.get(&ContextKey::hourly(3)).is_none());
    }

    #[test]
    fn test_count_outranks_engagement() {
        let ts = |day: u32| Utc.with_ymd_and_hms(2023, 6, day, 8, 0, 0).unwrap();
        let data = vec![
            Interaction::new("u1", "hot", 3.0, ts(12)),
            Interaction::new("u2", "hot", 3.0, ts(13)),
            Interaction::new("u3", "hot", 3.0, ts(14)),
            Interaction::new("u4", "rare", 5.0, ts(15))
                .with_review("Excellent! Exceeded my expectations.")
                .with_helpful_votes(10)
                .with_verified_purchase(true),
        ];
        let enriched = preprocess(&data, RatingScale::default());
        let popularity = GlobalPopularityRanking::build(&data);
        let index = ContextualIndex::build(&enriched, &ContextConfig::default(), &popularity);

        assert_eq!(index.get(&ContextKey::hourly(8)).unwrap().ranked(), ["hot", "rare"]);
    }

    #[test]
    fn test_engagement_breaks_count_ties() {
        let ts = |day: u32| Utc.with_ymd_and_hms(2023, 6, day, 8, 0, 0).unwrap();
        let data = vec![
            Interaction::new("u1", "a", 3.0, ts(12)),
            Interaction::new("u2", "b", 5.0, ts(13)).with_verified_purchase(true),
        ];
        let enriched = preprocess(&data, RatingScale::default());
        let popularity = GlobalPopularityRanking::build(&data);
        let index = ContextualIndex::build(&enriched, &ContextConfig::default(), &popularity);

        assert_eq!(index.get(&ContextKey::hourly(8)).unwrap().ranked(), ["b", "a"]);
    }

    #[test]
    fn test_day_of_week_granularity() {
        // 2023-06-12 Monday, 2023-06-13 Tuesday
        let enriched = rows(&[("a", 12, 8), ("b", 13, 8)]);
        let popularity = GlobalPopularityRanking::build(enriched.iter().map(|r| &r.interaction));
        let config = ContextConfig {
            granularity: ContextGranularity::DayOfWeekHour,
            ..Default::default()
        };
        let index = ContextualIndex::build(&enriched, &config, &popularity);

        assert_eq!(index.get(&ContextKey::weekly(0, 8)).unwrap().ranked(), ["a"]);
        assert_eq!(index.get(&ContextKey::weekly(1, 8)).unwrap().ranked(), ["b"]);
    }

    #[test]
    fn test_related_buckets() {
        let enriched = rows(&[
            ("a", 12, 8),
            ("b", 12, 8),
            ("a", 12, 9),
            ("b", 12, 9),
            ("c", 12, 22),
        ]);
        let popularity = GlobalPopularityRanking::build(enriched.iter().map(|r| &r.interaction));
        let index = ContextualIndex::build(&enriched, &ContextConfig::default(), &popularity);

        let related = index.related(&ContextKey::hourly(8), popularity.ranked(), 0.7);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].0, ContextKey::hourly(9));
        assert!((related[0].1 - 1.0).abs() < 1e-12);
    }
}
