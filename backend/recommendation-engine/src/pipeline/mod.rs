// ============================================
// Hybrid Recommendation Pipeline
// ============================================
//
// Owns the three components built from one Config.
//
// train:   dataset → BehavioralProfiler ─┐
//          dataset → ContextEngine ──────┼─▶ IntegrationModule
//
// predict: (user, timestamp) → profiler.predict + context.predict
//          → integrate → RecommendationList

use crate::config::Config;
use crate::dataset::validate_interactions;
use crate::error::Result;
use crate::models::{Interaction, ListBuilder, Prediction, RecommendationList, ScoredItem};
use crate::services::features::RatingScale;
use crate::services::popularity::ItemCatalog;
use crate::services::{BehavioralProfiler, ContextEngine, IntegrationModule};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

/// Fused list plus the upstream predictions it was built from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridPrediction {
    pub items: RecommendationList,
    pub behavioral: Prediction,
    pub contextual: Prediction,
    pub scored: Vec<ScoredItem>,
}

#[derive(Debug, Clone)]
pub struct HybridRecommender {
    config: Config,
    profiler: BehavioralProfiler,
    context_engine: ContextEngine,
    integration: IntegrationModule,
}

impl HybridRecommender {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let profiler = BehavioralProfiler::new(config.behavioral.clone())?;
        let context_engine = ContextEngine::new(config.context.clone())?
            .with_rating_scale(RatingScale::from_config(&config.behavioral));

        Ok(Self {
            config,
            profiler,
            context_engine,
            integration: IntegrationModule::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn profiler(&self) -> &BehavioralProfiler {
        &self.profiler
    }

    pub fn context_engine(&self) -> &ContextEngine {
        &self.context_engine
    }

    pub fn integration(&self) -> &IntegrationModule {
        &self.integration
    }

    pub fn is_trained(&self) -> bool {
        self.integration.is_trained()
    }

    /// Validate the dataset, then train profiler, context engine and
    /// integration in that order
    pub fn train(&mut self, interactions: &[Interaction]) -> Result<()> {
        validate_interactions(interactions)?;
        info!(rows = interactions.len(), "Training hybrid recommender");

        self.profiler.train(interactions)?;
        self.context_engine.train(interactions)?;
        self.integration
            .train(&self.profiler, &self.context_engine, &self.config.integration)?;

        info!("Hybrid recommender trained");
        Ok(())
    }

    /// Recommend up to `num_recommendations` items; a missing timestamp
    /// means now
    pub fn predict(
        &self,
        user_id: &str,
        timestamp: Option<DateTime<Utc>>,
        num_recommendations: usize,
    ) -> Result<RecommendationList> {
        Ok(self
            .predict_detailed(user_id, timestamp, num_recommendations)?
            .items)
    }

    pub fn predict_detailed(
        &self,
        user_id: &str,
        timestamp: Option<DateTime<Utc>>,
        num_recommendations: usize,
    ) -> Result<HybridPrediction> {
        let timestamp = timestamp.unwrap_or_else(Utc::now);

        let behavioral = self.profiler.predict(user_id, num_recommendations)?;
        let contextual = self
            .context_engine
            .predict(user_id, &timestamp, num_recommendations)?;

        let scored = self.integration.integrate_scored(
            behavioral.items(),
            contextual.items(),
            num_recommendations,
        )?;
        let mut builder = ListBuilder::new(num_recommendations);
        builder.extend(scored.iter().map(|item| item.item_id.as_str()));
        let items = builder.finish();

        debug!(
            user_id = %user_id,
            behavioral_fallback = ?behavioral.fallback_reason(),
            contextual_fallback = ?contextual.fallback_reason(),
            returned = items.len(),
            "Hybrid prediction"
        );

        Ok(HybridPrediction {
            items,
            behavioral,
            contextual,
            scored,
        })
    }

    pub fn catalog(&self) -> Result<ItemCatalog> {
        self.profiler.catalog()
    }
}
