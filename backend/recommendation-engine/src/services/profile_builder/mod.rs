// ============================================
// Behavioral Profiler (用戶畫像 / 行為分群)
// ============================================
//
// Training:
// 1. Preprocess interactions into derived features
// 2. Aggregate per-user behavior (BehaviorBuilder)
// 3. Standardize and cluster users into segments (k-means)
// 4. Rank items inside each segment (SegmentPreferenceTable)
//
// Prediction:
// - Known user with enough history → segment ranking minus seen items,
//   padded from global popularity
// - Known user below min_interactions → global popularity minus seen items
// - Unknown user → global popularity top-N
//
// Architecture:
// ┌─────────────────────────────────────────────────────┐
// │                BehavioralProfiler                   │
// ├─────────────────────────────────────────────────────┤
// │  ┌────────────────┐   ┌──────────────────────────┐  │
// │  │ BehaviorBuilder│──▶│ StandardScaler + KMeans  │  │
// │  └────────────────┘   └────────────┬─────────────┘  │
// │                                    │                │
// │  ┌─────────────────────────────────▼─────────────┐  │
// │  │   ProfileSnapshot (Arc, frozen after train)   │  │
// │  └───────────────────────────────────────────────┘  │
// └─────────────────────────────────────────────────────┘

pub mod behavior_builder;
pub mod segmentation;

pub use behavior_builder::{BehaviorBuilder, UserBehavior, FEATURE_DIMENSIONS};
pub use segmentation::{KMeans, KMeansFit, StandardScaler};

use crate::config::BehavioralConfig;
use crate::dataset::validate_interactions;
use crate::error::{RecommenderError, Result};
use crate::models::{
    EnrichedInteraction, FallbackReason, Interaction, ItemId, ListBuilder, Prediction,
    RankingSource, UserId,
};
use crate::services::features::{preprocess, RatingScale, TemporalPatterns};
use crate::services::popularity::{GlobalPopularityRanking, ItemCatalog};
use crate::utils::desc_score;
use ndarray::Array2;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// User behavior plus its assigned segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub behavior: UserBehavior,
    pub segment_id: usize,
}

/// Segment id → items ranked by aggregate preference within the segment
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SegmentPreferenceTable {
    rankings: BTreeMap<usize, Vec<ItemId>>,
}

impl SegmentPreferenceTable {
    pub fn get(&self, segment_id: usize) -> Option<&[ItemId]> {
        self.rankings.get(&segment_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rankings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rankings.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = usize> + '_ {
        self.rankings.keys().copied()
    }
}

/// Output of `segment_users`
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub profiles: BTreeMap<UserId, UserProfile>,
    pub preferences: SegmentPreferenceTable,
    pub effective_clusters: usize,
    pub inertia: f64,
}

/// Frozen result of one training pass
#[derive(Debug, Clone)]
pub struct ProfileSnapshot {
    pub profiles: BTreeMap<UserId, UserProfile>,
    pub preferences: SegmentPreferenceTable,
    pub effective_clusters: usize,
    pub inertia: f64,
    pub catalog: ItemCatalog,
    pub temporal_patterns: TemporalPatterns,
}

impl ProfileSnapshot {
    pub fn profile(&self, user_id: &str) -> Option<&UserProfile> {
        self.profiles.get(user_id)
    }

    pub fn popularity(&self) -> &GlobalPopularityRanking {
        &self.catalog.popularity
    }
}

/// One row per user in id order, one column per behavior feature
fn feature_matrix(behaviors: &BTreeMap<UserId, UserBehavior>) -> Array2<f64> {
    let vectors: Vec<[f64; FEATURE_DIMENSIONS]> =
        behaviors.values().map(UserBehavior::feature_vector).collect();
    Array2::from_shape_fn((vectors.len(), FEATURE_DIMENSIONS), |(row, col)| {
        vectors[row][col]
    })
}

/// Cluster users and rank items per segment.
///
/// The cluster count is reduced to the number of distinct users when
/// fewer users than `n_clusters` are present.
pub fn segment_users(rows: &[EnrichedInteraction], config: &BehavioralConfig) -> Segmentation {
    let behaviors = BehaviorBuilder::new(config.temporal_window).build(rows);
    if behaviors.is_empty() {
        return Segmentation {
            profiles: BTreeMap::new(),
            preferences: SegmentPreferenceTable::default(),
            effective_clusters: 0,
            inertia: 0.0,
        };
    }

    let effective_clusters = config.n_clusters.min(behaviors.len());
    if effective_clusters < config.n_clusters {
        warn!(
            requested_clusters = config.n_clusters,
            effective_clusters = effective_clusters,
            distinct_users = behaviors.len(),
            "Fewer users than clusters, reducing cluster count"
        );
    }

    let matrix = feature_matrix(&behaviors);
    let scaled = StandardScaler::fit_transform(&matrix);

    let fit = KMeans::new(effective_clusters, config.kmeans_seed)
        .with_restarts(config.kmeans_restarts)
        .with_max_iterations(config.kmeans_max_iterations)
        .fit(&scaled);

    let profiles: BTreeMap<UserId, UserProfile> = behaviors
        .into_iter()
        .zip(fit.labels.iter().copied())
        .map(|((user_id, behavior), segment_id)| {
            (
                user_id,
                UserProfile {
                    behavior,
                    segment_id,
                },
            )
        })
        .collect();

    let preferences = rank_segment_items(rows, &profiles, config);

    debug!(
        users = profiles.len(),
        segments = preferences.len(),
        inertia = fit.inertia,
        "Segmented users"
    );

    Segmentation {
        profiles,
        preferences,
        effective_clusters,
        inertia: fit.inertia,
    }
}

#[derive(Default)]
struct ItemPreference {
    score: f64,
    count: usize,
}

/// Each interaction adds rating / rating_max, plus its engagement score
/// when that reaches `engagement_threshold`.
fn rank_segment_items(
    rows: &[EnrichedInteraction],
    profiles: &BTreeMap<UserId, UserProfile>,
    config: &BehavioralConfig,
) -> SegmentPreferenceTable {
    let mut totals: BTreeMap<usize, HashMap<&str, ItemPreference>> = BTreeMap::new();

    for row in rows {
        let Some(profile) = profiles.get(&row.interaction.user_id) else {
            continue;
        };

        let mut contribution = row.interaction.rating / config.rating_max;
        if row.features.engagement_score >= config.engagement_threshold {
            contribution += row.features.engagement_score;
        }

        let entry = totals
            .entry(profile.segment_id)
            .or_default()
            .entry(row.interaction.item_id.as_str())
            .or_default();
        entry.score += contribution;
        entry.count += 1;
    }

    let rankings = totals
        .into_iter()
        .map(|(segment_id, items)| {
            let mut ranked: Vec<(&str, ItemPreference)> = items.into_iter().collect();
            ranked.sort_by(|a, b| {
                desc_score(a.1.score, b.1.score)
                    .then_with(|| b.1.count.cmp(&a.1.count))
                    .then_with(|| a.0.cmp(b.0))
            });
            let items = ranked.into_iter().map(|(item, _)| item.to_string()).collect();
            (segment_id, items)
        })
        .collect();

    SegmentPreferenceTable { rankings }
}

/// Behavioral segmentation recommender
#[derive(Debug, Clone)]
pub struct BehavioralProfiler {
    config: BehavioralConfig,
    snapshot: Option<Arc<ProfileSnapshot>>,
}

impl BehavioralProfiler {
    pub fn new(config: BehavioralConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            snapshot: None,
        })
    }

    pub fn config(&self) -> &BehavioralConfig {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Build every derived structure from `interactions`.
    ///
    /// Retraining replaces the previous snapshot only after the new one is
    /// complete.
    pub fn train(&mut self, interactions: &[Interaction]) -> Result<()> {
        validate_interactions(interactions)?;
        info!(rows = interactions.len(), "Training behavioral profiler");

        let rows = preprocess(interactions, RatingScale::from_config(&self.config));
        let temporal_patterns = TemporalPatterns::extract(&rows);
        let catalog = ItemCatalog::build(rows.iter().map(|row| &row.interaction));
        let segmentation = segment_users(&rows, &self.config);

        info!(
            users = segmentation.profiles.len(),
            items = catalog.popularity.len(),
            effective_clusters = segmentation.effective_clusters,
            "Behavioral profiler trained"
        );

        self.snapshot = Some(Arc::new(ProfileSnapshot {
            profiles: segmentation.profiles,
            preferences: segmentation.preferences,
            effective_clusters: segmentation.effective_clusters,
            inertia: segmentation.inertia,
            catalog,
            temporal_patterns,
        }));

        Ok(())
    }

    pub fn snapshot(&self) -> Result<Arc<ProfileSnapshot>> {
        self.trained("snapshot()").map(Arc::clone)
    }

    /// Popularity and category lookups shared with the integration module
    pub fn catalog(&self) -> Result<ItemCatalog> {
        Ok(self.trained("catalog()")?.catalog.clone())
    }

    pub fn temporal_patterns(&self) -> Result<&TemporalPatterns> {
        Ok(&self.trained("temporal_patterns()")?.temporal_patterns)
    }

    pub fn profile(&self, user_id: &str) -> Result<Option<&UserProfile>> {
        Ok(self.trained("profile()")?.profile(user_id))
    }

    pub fn predict(&self, user_id: &str, num_recommendations: usize) -> Result<Prediction> {
        let snapshot = self.trained("predict()")?;
        let popularity = snapshot.popularity();

        let Some(profile) = snapshot.profile(user_id) else {
            debug!(user_id = %user_id, "Cold-start user, serving global popularity");
            return Ok(Prediction::Fallback {
                items: popularity.top(num_recommendations),
                reason: FallbackReason::ColdStartUser,
            });
        };

        let behavior = &profile.behavior;
        let unseen_popular = popularity.iter().filter(|item| !behavior.has_seen(item));

        if behavior.interaction_count < self.config.min_interactions {
            debug!(
                user_id = %user_id,
                interactions = behavior.interaction_count,
                min_interactions = self.config.min_interactions,
                "Insufficient history, serving global popularity"
            );
            let mut builder = ListBuilder::new(num_recommendations);
            builder.extend(unseen_popular);
            return Ok(Prediction::Fallback {
                items: builder.finish(),
                reason: FallbackReason::InsufficientHistory,
            });
        }

        let mut builder = ListBuilder::new(num_recommendations);
        if let Some(ranked) = snapshot.preferences.get(profile.segment_id) {
            builder.extend(ranked.iter().filter(|item| !behavior.has_seen(item)));
        }
        let from_segment = builder.len();
        builder.extend(unseen_popular);
        let backfilled = builder.len() - from_segment;

        Ok(Prediction::Ranked {
            items: builder.finish(),
            source: RankingSource::Segment(profile.segment_id),
            backfilled,
        })
    }

    fn trained(&self, operation: &'static str) -> Result<&Arc<ProfileSnapshot>> {
        self.snapshot
            .as_ref()
            .ok_or_else(|| RecommenderError::not_trained("BehavioralProfiler", "train()", operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, d, h, 0, 0).unwrap()
    }

    fn dataset() -> Vec<Interaction> {
        vec![
            Interaction::new("alice", "i1", 5.0, at(1, 9)),
            Interaction::new("alice", "i2", 4.0, at(2, 10)),
            Interaction::new("alice", "i3", 5.0, at(3, 11)),
            Interaction::new("bob", "i1", 2.0, at(3, 22)),
            Interaction::new("bob", "i4", 1.0, at(4, 23)),
            Interaction::new("bob", "i5", 2.0, at(10, 21)),
            Interaction::new("carol", "i1", 4.0, at(5, 12)),
            Interaction::new("carol", "i2", 3.0, at(6, 13)),
        ]
    }

    fn config(n_clusters: usize) -> BehavioralConfig {
        BehavioralConfig {
            n_clusters,
            ..Default::default()
        }
    }

    #[test]
    fn test_cluster_count_reduced_to_user_count() {
        let rows = preprocess(&dataset(), RatingScale::default());
        let segmentation = segment_users(&rows, &config(5));

        assert_eq!(segmentation.effective_clusters, 3);
        assert_eq!(segmentation.profiles.len(), 3);
        assert!(segmentation
            .profiles
            .values()
            .all(|profile| profile.segment_id < 3));
    }

    #[test]
    fn test_segment_ranking_prefers_high_rated_items() {
        let rows = preprocess(&dataset(), RatingScale::default());
        let segmentation = segment_users(&rows, &config(1));

        let ranked = segmentation.preferences.get(0).unwrap();
        // i1 is rated by all three users
        assert_eq!(ranked[0], "i1");
        assert_eq!(ranked.len(), 5);
    }

    #[test]
    fn test_predict_before_train_fails() {
        let profiler = BehavioralProfiler::new(BehavioralConfig::default()).unwrap();
        let err = profiler.predict("alice", 5).unwrap_err();

        assert!(err.is_not_trained());
        assert_eq!(
            err.to_string(),
            "BehavioralProfiler must be trained first. Call train() before predict()."
        );
    }

    #[test]
    fn test_predict_excludes_seen_and_pads() {
        let mut profiler = BehavioralProfiler::new(config(2)).unwrap();
        profiler.train(&dataset()).unwrap();

        let prediction = profiler.predict("alice", 3).unwrap();
        let items = prediction.items();

        assert!(!prediction.is_fallback());
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| !["i1", "i2", "i3"].contains(&item.as_str())));
    }

    #[test]
    fn test_cold_start_gets_global_top() {
        let mut profiler = BehavioralProfiler::new(config(2)).unwrap();
        profiler.train(&dataset()).unwrap();

        let prediction = profiler.predict("nobody", 2).unwrap();
        assert_eq!(prediction.fallback_reason(), Some(FallbackReason::ColdStartUser));
        assert_eq!(prediction.items().items(), ["i1", "i2"]);
    }

    #[test]
    fn test_insufficient_history_fallback() {
        let mut data = dataset();
        data.push(Interaction::new("dave", "i1", 3.0, at(7, 8)));

        let mut profiler = BehavioralProfiler::new(config(2)).unwrap();
        profiler.train(&data).unwrap();

        let prediction = profiler.predict("dave", 2).unwrap();
        assert_eq!(
            prediction.fallback_reason(),
            Some(FallbackReason::InsufficientHistory)
        );
        assert_eq!(prediction.items().items(), ["i2", "i3"]);
    }

    #[test]
    fn test_zero_clusters_rejected() {
        assert!(BehavioralProfiler::new(config(0)).is_err());
    }

    #[test]
    fn test_feature_matrix_rows_follow_user_order() {
        let ts = Utc.with_ymd_and_hms(2023, 6, 15, 9, 0, 0).unwrap();
        let data = vec![
            Interaction::new("b", "i1", 2.0, ts),
            Interaction::new("a", "i1", 5.0, ts),
            Interaction::new("a", "i2", 4.0, ts),
        ];
        let behaviors = BehaviorBuilder::new(30).build(&preprocess(&data, RatingScale::default()));
        let matrix = feature_matrix(&behaviors);

        assert_eq!(matrix.dim(), (2, FEATURE_DIMENSIONS));
        assert_eq!(matrix.row(0).to_vec(), behaviors["a"].feature_vector().to_vec());
        assert_eq!(matrix.row(1).to_vec(), behaviors["b"].feature_vector().to_vec());
        assert_eq!(matrix[[0, 1]], 2.0);
    }

    #[test]
    fn test_training_is_deterministic() {
        let mut a = BehavioralProfiler::new(config(2)).unwrap();
        let mut b = BehavioralProfiler::new(config(2)).unwrap();
        a.train(&dataset()).unwrap();
        b.train(&dataset()).unwrap();

        let segments = |p: &BehavioralProfiler| {
            p.snapshot()
                .unwrap()
                .profiles
                .values()
                .map(|profile| profile.segment_id)
                .collect::<Vec<_>>()
        };
        assert_eq!(segments(&a), segments(&b));
    }
}
