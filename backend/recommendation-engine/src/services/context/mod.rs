// ============================================
// Context Engine (情境推薦)
// ============================================
//
// Buckets training interactions by time context (hour of day, or day of
// week x hour) and ranks items inside every bucket. A request timestamp
// maps to one bucket; sparse or unseen buckets are filled from global
// popularity.

pub mod index;

pub use index::{context_key, ContextBucket, ContextualIndex};

use crate::config::ContextConfig;
use crate::dataset::validate_interactions;
use crate::error::{RecommenderError, Result};
use crate::models::{
    ContextKey, FallbackReason, Interaction, ListBuilder, Prediction, RankingSource,
};
use crate::services::features::{preprocess, RatingScale, TimeContext};
use crate::services::popularity::GlobalPopularityRanking;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Frozen result of one training pass
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub index: ContextualIndex,
    pub popularity: Arc<GlobalPopularityRanking>,
}

#[derive(Debug, Clone)]
pub struct ContextEngine {
    config: ContextConfig,
    rating_scale: RatingScale,
    snapshot: Option<Arc<ContextSnapshot>>,
}

impl ContextEngine {
    pub fn new(config: ContextConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rating_scale: RatingScale::default(),
            snapshot: None,
        })
    }

    /// Rating scale used for the engagement polarity term
    pub fn with_rating_scale(mut self, rating_scale: RatingScale) -> Self {
        self.rating_scale = rating_scale;
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn train(&mut self, interactions: &[Interaction]) -> Result<()> {
        validate_interactions(interactions)?;
        info!(
            rows = interactions.len(),
            granularity = ?self.config.granularity,
            "Training context engine"
        );

        let rows = preprocess(interactions, self.rating_scale);
        let popularity = Arc::new(GlobalPopularityRanking::build(
            rows.iter().map(|row| &row.interaction),
        ));
        let index = ContextualIndex::build(&rows, &self.config, &popularity);

        info!(buckets = index.len(), "Context engine trained");

        self.snapshot = Some(Arc::new(ContextSnapshot { index, popularity }));
        Ok(())
    }

    pub fn snapshot(&self) -> Result<Arc<ContextSnapshot>> {
        self.trained("snapshot()").map(Arc::clone)
    }

    /// Context key a timestamp falls into under the configured granularity
    pub fn context_key(&self, timestamp: &DateTime<Utc>) -> ContextKey {
        context_key(self.config.granularity, &TimeContext::from_timestamp(timestamp))
    }

    /// Items popular in the context of `timestamp`.
    ///
    /// The ranking depends only on the context; `user_id` is carried for
    /// tracing.
    pub fn predict(
        &self,
        user_id: &str,
        timestamp: &DateTime<Utc>,
        num_recommendations: usize,
    ) -> Result<Prediction> {
        let snapshot = self.trained("predict()")?;
        let key = self.context_key(timestamp);

        let bucket = match snapshot.index.get(&key) {
            Some(bucket) if !bucket.is_empty() => bucket,
            _ => {
                debug!(
                    user_id = %user_id,
                    context = %key,
                    "Unseen context, serving global popularity"
                );
                return Ok(Prediction::Fallback {
                    items: snapshot.popularity.top(num_recommendations),
                    reason: FallbackReason::UnseenContext,
                });
            }
        };

        let mut builder = ListBuilder::new(num_recommendations);
        builder.extend(bucket.ranked());
        let from_bucket = builder.len();
        builder.extend(snapshot.popularity.iter());
        let backfilled = builder.len() - from_bucket;

        if backfilled > 0 {
            debug!(
                user_id = %user_id,
                context = %key,
                backfilled = backfilled,
                "Sparse context, filled from global popularity"
            );
        }

        Ok(Prediction::Ranked {
            items: builder.finish(),
            source: RankingSource::Context(key),
            backfilled,
        })
    }

    /// Contexts whose item distribution resembles `key`'s, most similar
    /// first, filtered by `similarity_threshold`
    pub fn related_contexts(&self, key: &ContextKey) -> Result<Vec<(ContextKey, f64)>> {
        let snapshot = self.trained("related_contexts()")?;
        Ok(snapshot.index.related(
            key,
            snapshot.popularity.ranked(),
            self.config.similarity_threshold,
        ))
    }

    fn trained(&self, operation: &'static str) -> Result<&Arc<ContextSnapshot>> {
        self.snapshot
            .as_ref()
            .ok_or_else(|| RecommenderError::not_trained("ContextEngine", "train()", operation))
    }
}
