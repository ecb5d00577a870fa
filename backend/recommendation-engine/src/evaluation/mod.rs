// ============================================
// Offline Evaluation
// ============================================
//
// Metrics over a holdout set:
// - precision@k / recall@k against the user's holdout items
// - intra-list diversity: unique categories / list length
// - novelty: share of recommended items outside the global top-N

use crate::error::Result;
use crate::models::{Interaction, ItemId, UserId};
use crate::pipeline::HybridRecommender;
use crate::services::popularity::{GlobalPopularityRanking, ItemCatalog};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Precision@k and recall@k.
///
/// Precision divides by `k`, not by the list length, so short lists are
/// penalised.
pub fn precision_recall_at_k(
    recommendations: &[ItemId],
    relevant: &HashSet<ItemId>,
    k: usize,
) -> (f64, f64) {
    if relevant.is_empty() || k == 0 {
        return (0.0, 0.0);
    }

    let hits = recommendations
        .iter()
        .take(k)
        .collect::<HashSet<_>>()
        .into_iter()
        .filter(|item| relevant.contains(*item))
        .count();

    (hits as f64 / k as f64, hits as f64 / relevant.len() as f64)
}

/// Unique categories over list length; 0 for lists shorter than 2.
/// Uncategorised items count as their own category.
pub fn intra_list_diversity(recommendations: &[ItemId], catalog: &ItemCatalog) -> f64 {
    if recommendations.len() < 2 {
        return 0.0;
    }

    let mut categories: HashSet<&str> = HashSet::new();
    let mut uncategorised = 0usize;
    for item in recommendations {
        match catalog.category(item) {
            Some(category) => {
                categories.insert(category);
            }
            None => uncategorised += 1,
        }
    }

    (categories.len() + uncategorised) as f64 / recommendations.len() as f64
}

/// Share of items outside the `top_n` most popular
pub fn novelty(
    recommendations: &[ItemId],
    popularity: &GlobalPopularityRanking,
    top_n: usize,
) -> f64 {
    if recommendations.is_empty() {
        return 0.0;
    }

    let novel = recommendations
        .iter()
        .filter(|item| !popularity.is_within_top(item, top_n))
        .count();
    novel as f64 / recommendations.len() as f64
}

/// Shuffle with a fixed seed and hold out `test_fraction` of the rows
pub fn train_test_split(
    interactions: &[Interaction],
    test_fraction: f64,
    seed: u64,
) -> (Vec<Interaction>, Vec<Interaction>) {
    let mut rows = interactions.to_vec();
    rows.shuffle(&mut StdRng::seed_from_u64(seed));

    let test_len = (rows.len() as f64 * test_fraction.clamp(0.0, 1.0)).round() as usize;
    let train = rows.split_off(test_len);
    (train, rows)
}

#[derive(Debug, Clone)]
pub struct EvaluationOptions {
    /// Cut-off for precision/recall and the list length requested
    pub k: usize,
    /// Request time passed to the context engine
    pub at: DateTime<Utc>,
    /// Evaluate at most this many holdout users, in order of appearance
    pub max_users: usize,
    /// Size of the "popular" set for the novelty metric
    pub novelty_top_n: usize,
}

impl EvaluationOptions {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            k: 10,
            at,
            max_users: 100,
            novelty_top_n: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub users: usize,
    pub precision: f64,
    pub recall: f64,
    pub diversity: f64,
    pub novelty: f64,
}

/// Average every metric over the holdout users
pub fn evaluate(
    recommender: &HybridRecommender,
    holdout: &[Interaction],
    options: &EvaluationOptions,
) -> Result<EvaluationReport> {
    let catalog = recommender.catalog()?;

    let mut order: Vec<&UserId> = Vec::new();
    let mut relevant: HashMap<&UserId, HashSet<ItemId>> = HashMap::new();
    for row in holdout {
        let items = relevant.entry(&row.user_id).or_insert_with(|| {
            order.push(&row.user_id);
            HashSet::new()
        });
        items.insert(row.item_id.clone());
    }

    let mut report = EvaluationReport::default();
    for user_id in order.into_iter().take(options.max_users) {
        let recommendations = recommender.predict(user_id, Some(options.at), options.k)?;
        let (precision, recall) =
            precision_recall_at_k(&recommendations, &relevant[user_id], options.k);

        report.users += 1;
        report.precision += precision;
        report.recall += recall;
        report.diversity += intra_list_diversity(&recommendations, &catalog);
        report.novelty += novelty(&recommendations, &catalog.popularity, options.novelty_top_n);
    }

    if report.users > 0 {
        let users = report.users as f64;
        report.precision /= users;
        report.recall /= users;
        report.diversity /= users;
        report.novelty /= users;
    }

    info!(
        users = report.users,
        precision = report.precision,
        recall = report.recall,
        diversity = report.diversity,
        novelty = report.novelty,
        "Evaluation finished"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dataset::synthetic::{generate, SyntheticConfig};
    use chrono::TimeZone;

    fn ids(items: &[&str]) -> Vec<ItemId> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_precision_recall() {
        let relevant: HashSet<ItemId> = ids(&["a", "c", "x"]).into_iter().collect();
        let (precision, recall) = precision_recall_at_k(&ids(&["a", "b", "c", "d"]), &relevant, 4);

        assert!((precision - 0.5).abs() < 1e-12);
        assert!((recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(precision_recall_at_k(&ids(&["a"]), &HashSet::new(), 4), (0.0, 0.0));
    }

    #[test]
    fn test_diversity_and_novelty() {
        let ts = Utc.with_ymd_and_hms(2023, 6, 15, 12, 0, 0).unwrap();
        let rows = vec![
            Interaction::new("u1", "a", 4.0, ts).with_category("Books"),
            Interaction::new("u2", "a", 4.0, ts).with_category("Books"),
            Interaction::new("u1", "b", 4.0, ts).with_category("Books"),
            Interaction::new("u1", "c", 4.0, ts).with_category("Home"),
        ];
        let catalog = ItemCatalog::build(&rows);

        let list = ids(&["a", "b", "c", "z"]);
        // Books, Home, plus uncategorised "z"
        assert!((intra_list_diversity(&list, &catalog) - 0.75).abs() < 1e-12);
        assert_eq!(intra_list_diversity(&ids(&["a"]), &catalog), 0.0);

        // only "a" is inside the top 1
        assert!((novelty(&list, &catalog.popularity, 1) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_split_sizes() {
        let data = generate(&SyntheticConfig::small());
        let (train, test) = train_test_split(&data, 0.2, 42);

        assert_eq!(train.len(), 40);
        assert_eq!(test.len(), 10);
    }

    #[test]
    fn test_evaluate_report_is_bounded() {
        let data = generate(&SyntheticConfig::medium());
        let (train, test) = train_test_split(&data, 0.2, 42);

        let mut recommender = HybridRecommender::new(Config::default()).unwrap();
        recommender.train(&train).unwrap();

        let options = EvaluationOptions {
            max_users: 20,
            ..EvaluationOptions::new(Utc.with_ymd_and_hms(2023, 6, 15, 14, 30, 0).unwrap())
        };
        let report = evaluate(&recommender, &test, &options).unwrap();

        assert_eq!(report.users, 20);
        for metric in [report.precision, report.recall, report.diversity, report.novelty] {
            assert!((0.0..=1.0).contains(&metric));
        }
    }
}
