use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use recommendation_engine::dataset::{self, synthetic};
use recommendation_engine::{Config, HybridRecommender};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Run settings read from `REC_*` variables, next to the model config
#[derive(Debug, Deserialize)]
struct RunSettings {
    dataset_path: Option<String>,
    /// Comma-separated user ids
    #[serde(default)]
    users: Vec<String>,
    #[serde(default = "default_num_recommendations")]
    num_recommendations: usize,
    /// RFC 3339 request time; defaults to now
    timestamp: Option<String>,
}

fn default_num_recommendations() -> usize {
    10
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().context("Failed to load config")?;
    let settings: RunSettings = envy::prefixed("REC_")
        .from_env()
        .context("Failed to read REC_* run settings")?;

    let interactions = match settings.dataset_path.as_deref() {
        Some(path) => dataset::load_json(path)
            .with_context(|| format!("Failed to load dataset from {}", path))?,
        None => {
            warn!("REC_DATASET_PATH not set, generating a synthetic dataset");
            synthetic::generate(&synthetic::SyntheticConfig::default())
        }
    };

    let timestamp = settings
        .timestamp
        .as_deref()
        .map(DateTime::parse_from_rfc3339)
        .transpose()
        .context("REC_TIMESTAMP must be an RFC 3339 timestamp")?
        .map(|ts| ts.with_timezone(&Utc));

    let mut recommender = HybridRecommender::new(config).context("Invalid configuration")?;
    recommender
        .train(&interactions)
        .context("Failed to train recommender")?;

    let users = if settings.users.is_empty() {
        interactions
            .first()
            .map(|row| vec![row.user_id.clone()])
            .unwrap_or_default()
    } else {
        settings.users
    };

    info!(
        users = users.len(),
        num_recommendations = settings.num_recommendations,
        "Serving recommendations"
    );

    for user_id in &users {
        let recommendations = recommender
            .predict(user_id, timestamp, settings.num_recommendations)
            .with_context(|| format!("Prediction failed for {}", user_id))?;

        let line = serde_json::json!({
            "user_id": user_id,
            "recommendations": recommendations,
        });
        println!("{}", line);
    }

    Ok(())
}
