// ============================================
// Integration Module (融合排序)
// ============================================
//
// Fuses the behavioral and contextual lists into one ranking:
// 1. Rank fusion: w_behavioral / (rank + 1) + w_contextual / (rank + 1)
// 2. Novelty: items outside the global top-K get score * (1 + novelty_factor)
// 3. Confidence: w_b·[in behavioral] + w_c·[in contextual] + w_agreement·[in both]
// 4. Ordering: score desc, best rank asc, first appearance asc
// 5. Diversity re-rank over item categories, then truncate to N
//
// Upstream components are never retrained here; training only checks they
// are ready and captures the item catalog.

use crate::config::{EnsembleWeights, IntegrationConfig};
use crate::error::{RecommenderError, Result};
use crate::models::{ItemId, ListBuilder, RecommendationList, ScoredItem};
use crate::services::context::ContextEngine;
use crate::services::diversity::DiversityLayer;
use crate::services::popularity::ItemCatalog;
use crate::services::profile_builder::BehavioralProfiler;
use crate::utils::{desc_score, rank_score};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug)]
struct TrainedState {
    config: IntegrationConfig,
    weights: EnsembleWeights,
    catalog: ItemCatalog,
}

struct Candidate<'a> {
    item_id: &'a str,
    behavioral_rank: Option<usize>,
    contextual_rank: Option<usize>,
    order: usize,
}

impl Candidate<'_> {
    fn best_rank(&self) -> usize {
        match (self.behavioral_rank, self.contextual_rank) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => usize::MAX,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntegrationModule {
    state: Option<Arc<TrainedState>>,
}

impl IntegrationModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_trained(&self) -> bool {
        self.state.is_some()
    }

    pub fn weights(&self) -> Result<EnsembleWeights> {
        Ok(self.trained("weights()")?.weights)
    }

    /// Validate `config` and bind to the trained upstream components
    pub fn train(
        &mut self,
        profiler: &BehavioralProfiler,
        context_engine: &ContextEngine,
        config: &IntegrationConfig,
    ) -> Result<()> {
        config.validate()?;

        if !profiler.is_trained() {
            return Err(RecommenderError::not_trained(
                "BehavioralProfiler",
                "train()",
                "IntegrationModule::train()",
            ));
        }
        if !context_engine.is_trained() {
            return Err(RecommenderError::not_trained(
                "ContextEngine",
                "train()",
                "IntegrationModule::train()",
            ));
        }

        self.train_with_catalog(config, profiler.catalog()?)
    }

    /// Train against an explicit item catalog
    pub fn train_with_catalog(
        &mut self,
        config: &IntegrationConfig,
        catalog: ItemCatalog,
    ) -> Result<()> {
        config.validate()?;
        let weights = config.weights()?;

        info!(
            behavioral_weight = weights.behavioral,
            contextual_weight = weights.contextual,
            agreement_weight = weights.agreement,
            diversity_factor = config.diversity_factor,
            novelty_factor = config.novelty_factor,
            "Integration module trained"
        );

        self.state = Some(Arc::new(TrainedState {
            config: config.clone(),
            weights,
            catalog,
        }));
        Ok(())
    }

    pub fn integrate(
        &self,
        user_predictions: &[ItemId],
        context_predictions: &[ItemId],
        num_recommendations: usize,
    ) -> Result<RecommendationList> {
        let scored = self.fuse(user_predictions, context_predictions, num_recommendations)?;

        let mut builder = ListBuilder::new(num_recommendations);
        builder.extend(scored.iter().map(|item| item.item_id.as_str()));
        Ok(builder.finish())
    }

    /// Same ordering as `integrate`, with scores and confidence attached
    pub fn integrate_scored(
        &self,
        user_predictions: &[ItemId],
        context_predictions: &[ItemId],
        num_recommendations: usize,
    ) -> Result<Vec<ScoredItem>> {
        self.fuse(user_predictions, context_predictions, num_recommendations)
    }

    fn fuse(
        &self,
        user_predictions: &[ItemId],
        context_predictions: &[ItemId],
        num_recommendations: usize,
    ) -> Result<Vec<ScoredItem>> {
        let state = self.trained("integrate()")?;

        if user_predictions.is_empty() && context_predictions.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = collect_candidates(user_predictions, context_predictions);
        let mut scored: Vec<(ScoredItem, usize)> = candidates
            .iter()
            .map(|candidate| (score_candidate(candidate, state), candidate.order))
            .collect();

        scored.sort_by(|a, b| {
            desc_score(a.0.score, b.0.score)
                .then_with(|| a.0.best_rank.cmp(&b.0.best_rank))
                .then_with(|| a.1.cmp(&b.1))
        });

        let ranked: Vec<ScoredItem> = scored.into_iter().map(|(item, _)| item).collect();
        let candidate_count = ranked.len();
        let fused = DiversityLayer::new(state.config.diversity_factor).rerank(
            ranked,
            num_recommendations,
            &state.catalog,
        );

        debug!(
            behavioral = user_predictions.len(),
            contextual = context_predictions.len(),
            candidates = candidate_count,
            returned = fused.len(),
            confident = fused.iter().filter(|item| item.confident).count(),
            "Fused recommendation lists"
        );

        Ok(fused)
    }

    fn trained(&self, operation: &'static str) -> Result<&TrainedState> {
        self.state
            .as_deref()
            .ok_or_else(|| RecommenderError::not_trained("IntegrationModule", "train()", operation))
    }
}

/// Union of both lists in first-appearance order (behavioral first).
/// A repeated item keeps its first rank within a list.
fn collect_candidates<'a>(
    user_predictions: &'a [ItemId],
    context_predictions: &'a [ItemId],
) -> Vec<Candidate<'a>> {
    let mut candidates: Vec<Candidate<'a>> = Vec::new();
    let mut positions: HashMap<&'a str, usize> = HashMap::new();

    for (rank, item_id) in user_predictions.iter().enumerate() {
        if positions.contains_key(item_id.as_str()) {
            continue;
        }
        positions.insert(item_id, candidates.len());
        candidates.push(Candidate {
            item_id,
            behavioral_rank: Some(rank),
            contextual_rank: None,
            order: candidates.len(),
        });
    }

    for (rank, item_id) in context_predictions.iter().enumerate() {
        match positions.get(item_id.as_str()) {
            Some(&index) => {
                let candidate = &mut candidates[index];
                if candidate.contextual_rank.is_none() {
                    candidate.contextual_rank = Some(rank);
                }
            }
            None => {
                positions.insert(item_id, candidates.len());
                candidates.push(Candidate {
                    item_id,
                    behavioral_rank: None,
                    contextual_rank: Some(rank),
                    order: candidates.len(),
                });
            }
        }
    }

    candidates
}

fn score_candidate(candidate: &Candidate<'_>, state: &TrainedState) -> ScoredItem {
    let weights = &state.weights;
    let config = &state.config;

    let mut score = candidate
        .behavioral_rank
        .map_or(0.0, |rank| weights.behavioral * rank_score(rank))
        + candidate
            .contextual_rank
            .map_or(0.0, |rank| weights.contextual * rank_score(rank));

    if config.novelty_factor > 0.0
        && !state
            .catalog
            .popularity
            .is_within_top(candidate.item_id, config.novelty_top_k)
    {
        score *= 1.0 + config.novelty_factor;
    }

    let in_behavioral = candidate.behavioral_rank.is_some();
    let in_contextual = candidate.contextual_rank.is_some();
    let mut confidence = 0.0;
    if in_behavioral {
        confidence += weights.behavioral;
    }
    if in_contextual {
        confidence += weights.contextual;
    }
    if in_behavioral && in_contextual {
        confidence += weights.agreement;
    }

    ScoredItem {
        item_id: candidate.item_id.to_string(),
        score,
        confidence,
        confident: confidence >= config.confidence_threshold,
        best_rank: candidate.best_rank(),
    }
}
