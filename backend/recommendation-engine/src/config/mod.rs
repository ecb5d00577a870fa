use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

/// Allowed deviation of the ensemble weight sum from 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Configuration must contain the '{0}' group")]
    MissingGroup(&'static str),

    #[error("n_clusters must be a positive integer, got {0}")]
    InvalidClusterCount(i64),

    #[error("ensemble_weights must contain exactly 3 values, got {0}")]
    EnsembleWeightsLength(usize),

    #[error("ensemble_weights[{index}] must be a non-negative number, got {value}")]
    NegativeEnsembleWeight { index: usize, value: f64 },

    #[error("ensemble_weights must sum to 1.0, got {0}")]
    EnsembleWeightsSum(f64),

    #[error("{field} = {value} is out of range (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("Invalid environment configuration: {0}")]
    Env(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(alias = "user_analytics")]
    pub behavioral: BehavioralConfig,
    #[serde(alias = "context_engine")]
    pub context: ContextConfig,
    pub integration: IntegrationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehavioralConfig {
    /// Requested number of behavioral segments
    pub n_clusters: usize,
    /// Days before the latest interaction that count as "recent"
    pub temporal_window: u32,
    /// Users below this count are served from global popularity
    pub min_interactions: usize,
    /// Engagement score from which an interaction boosts segment preference
    pub engagement_threshold: f64,
    pub rating_min: f64,
    pub rating_max: f64,
    pub kmeans_seed: u64,
    pub kmeans_restarts: usize,
    pub kmeans_max_iterations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextGranularity {
    /// 24 buckets, one per hour of day
    #[default]
    Hour,
    /// 168 buckets, one per (day of week, hour)
    DayOfWeekHour,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Minimum cosine similarity for two context buckets to count as related
    pub similarity_threshold: f64,
    pub temporal_weight: f64,
    pub spatial_weight: f64,
    pub social_weight: f64,
    pub activity_weight: f64,
    pub granularity: ContextGranularity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// [behavioral, contextual, agreement]
    pub ensemble_weights: Vec<f64>,
    pub confidence_threshold: f64,
    pub diversity_factor: f64,
    /// Score multiplier bonus for items outside the global top `novelty_top_k`.
    /// Adjacent ranks r and r+1 of one source swap once
    /// `1 + novelty_factor > (r + 2) / (r + 1)`, so values below 1.0 keep
    /// ranks 0 and 1 of a single source in order.
    pub novelty_factor: f64,
    /// Items ranked inside this prefix of global popularity get no novelty bonus
    pub novelty_top_k: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            behavioral: BehavioralConfig::default(),
            context: ContextConfig::default(),
            integration: IntegrationConfig::default(),
        }
    }
}

impl Default for BehavioralConfig {
    fn default() -> Self {
        Self {
            n_clusters: 5,
            temporal_window: 30,
            min_interactions: 3,
            engagement_threshold: 0.5,
            rating_min: 1.0,
            rating_max: 5.0,
            kmeans_seed: 42,
            kmeans_restarts: 10,
            kmeans_max_iterations: 300,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            temporal_weight: 0.3,
            spatial_weight: 0.2,
            social_weight: 0.3,
            activity_weight: 0.2,
            granularity: ContextGranularity::Hour,
        }
    }
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            ensemble_weights: vec![0.4, 0.3, 0.3],
            confidence_threshold: 0.6,
            diversity_factor: 0.2,
            novelty_factor: 0.1,
            novelty_top_k: 20,
        }
    }
}

/// Validated ensemble weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleWeights {
    pub behavioral: f64,
    pub contextual: f64,
    /// Weight of cross-source agreement, used for confidence scoring
    pub agreement: f64,
}

impl EnsembleWeights {
    pub fn from_slice(weights: &[f64]) -> Result<Self> {
        if weights.len() != 3 {
            return Err(ConfigError::EnsembleWeightsLength(weights.len()));
        }

        for (index, &value) in weights.iter().enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::NegativeEnsembleWeight { index, value });
            }
        }

        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::EnsembleWeightsSum(sum));
        }

        Ok(Self {
            behavioral: weights[0],
            contextual: weights[1],
            agreement: weights[2],
        })
    }
}

impl Config {
    /// Parse a JSON configuration document.
    ///
    /// All three groups must be present; fields missing inside a group keep
    /// their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let document: Value =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let groups = document
            .as_object()
            .ok_or_else(|| ConfigError::Parse("configuration root must be an object".to_string()))?;

        let behavioral = group(groups, "behavioral", Some("user_analytics"))
            .ok_or(ConfigError::MissingGroup("behavioral"))?;
        group(groups, "context", Some("context_engine"))
            .ok_or(ConfigError::MissingGroup("context"))?;
        let integration =
            group(groups, "integration", None).ok_or(ConfigError::MissingGroup("integration"))?;

        if let Some(n_clusters) = behavioral.get("n_clusters").and_then(Value::as_i64) {
            if n_clusters <= 0 {
                return Err(ConfigError::InvalidClusterCount(n_clusters));
            }
        }

        if let Some(weights) = integration.get("ensemble_weights") {
            let weights = weights.as_array().ok_or_else(|| {
                ConfigError::Parse("ensemble_weights must be an array".to_string())
            })?;
            if weights.len() != 3 {
                return Err(ConfigError::EnsembleWeightsLength(weights.len()));
            }
        }

        let config: Config =
            serde_json::from_value(document).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    /// Load config from `REC_*` environment variables (and `.env`).
    ///
    /// `REC_CONFIG_PATH` selects a JSON file as the base; individual
    /// variables override it.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let overrides: EnvOverrides = envy::prefixed("REC_")
            .from_env()
            .map_err(|e| ConfigError::Env(e.to_string()))?;

        let mut config = match overrides.config_path.as_deref() {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        overrides.apply(&mut config);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.behavioral.validate()?;
        self.context.validate()?;
        self.integration.validate()?;
        Ok(())
    }
}

impl BehavioralConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_clusters == 0 {
            return Err(ConfigError::InvalidClusterCount(0));
        }
        if self.min_interactions == 0 {
            return Err(ConfigError::OutOfRange {
                field: "min_interactions",
                value: 0.0,
                expected: "> 0",
            });
        }
        check_unit_interval("engagement_threshold", self.engagement_threshold)?;
        if !self.rating_min.is_finite()
            || !self.rating_max.is_finite()
            || self.rating_min >= self.rating_max
        {
            return Err(ConfigError::OutOfRange {
                field: "rating_max",
                value: self.rating_max,
                expected: "finite and greater than rating_min",
            });
        }
        if self.kmeans_restarts == 0 {
            return Err(ConfigError::OutOfRange {
                field: "kmeans_restarts",
                value: 0.0,
                expected: "> 0",
            });
        }
        if self.kmeans_max_iterations == 0 {
            return Err(ConfigError::OutOfRange {
                field: "kmeans_max_iterations",
                value: 0.0,
                expected: "> 0",
            });
        }
        Ok(())
    }
}

impl ContextConfig {
    pub fn validate(&self) -> Result<()> {
        check_unit_interval("similarity_threshold", self.similarity_threshold)?;
        check_non_negative("temporal_weight", self.temporal_weight)?;
        check_non_negative("spatial_weight", self.spatial_weight)?;
        check_non_negative("social_weight", self.social_weight)?;
        check_non_negative("activity_weight", self.activity_weight)?;
        Ok(())
    }
}

impl IntegrationConfig {
    pub fn validate(&self) -> Result<()> {
        EnsembleWeights::from_slice(&self.ensemble_weights)?;
        check_unit_interval("confidence_threshold", self.confidence_threshold)?;
        check_non_negative("diversity_factor", self.diversity_factor)?;
        check_non_negative("novelty_factor", self.novelty_factor)?;
        Ok(())
    }

    pub fn weights(&self) -> Result<EnsembleWeights> {
        EnsembleWeights::from_slice(&self.ensemble_weights)
    }
}

#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    config_path: Option<String>,
    n_clusters: Option<usize>,
    temporal_window: Option<u32>,
    min_interactions: Option<usize>,
    engagement_threshold: Option<f64>,
    similarity_threshold: Option<f64>,
    temporal_weight: Option<f64>,
    spatial_weight: Option<f64>,
    social_weight: Option<f64>,
    activity_weight: Option<f64>,
    context_granularity: Option<ContextGranularity>,
    ensemble_weights: Option<Vec<f64>>,
    confidence_threshold: Option<f64>,
    diversity_factor: Option<f64>,
    novelty_factor: Option<f64>,
    novelty_top_k: Option<usize>,
}

impl EnvOverrides {
    fn apply(self, config: &mut Config) {
        let behavioral = &mut config.behavioral;
        if let Some(v) = self.n_clusters {
            behavioral.n_clusters = v;
        }
        if let Some(v) = self.temporal_window {
            behavioral.temporal_window = v;
        }
        if let Some(v) = self.min_interactions {
            behavioral.min_interactions = v;
        }
        if let Some(v) = self.engagement_threshold {
            behavioral.engagement_threshold = v;
        }

        let context = &mut config.context;
        if let Some(v) = self.similarity_threshold {
            context.similarity_threshold = v;
        }
        if let Some(v) = self.temporal_weight {
            context.temporal_weight = v;
        }
        if let Some(v) = self.spatial_weight {
            context.spatial_weight = v;
        }
        if let Some(v) = self.social_weight {
            context.social_weight = v;
        }
        if let Some(v) = self.activity_weight {
            context.activity_weight = v;
        }
        if let Some(v) = self.context_granularity {
            context.granularity = v;
        }

        let integration = &mut config.integration;
        if let Some(v) = self.ensemble_weights {
            integration.ensemble_weights = v;
        }
        if let Some(v) = self.confidence_threshold {
            integration.confidence_threshold = v;
        }
        if let Some(v) = self.diversity_factor {
            integration.diversity_factor = v;
        }
        if let Some(v) = self.novelty_factor {
            integration.novelty_factor = v;
        }
        if let Some(v) = self.novelty_top_k {
            integration.novelty_top_k = v;
        }
    }
}

fn group<'a>(groups: &'a Map<String, Value>, name: &str, alias: Option<&str>) -> Option<&'a Value> {
    groups
        .get(name)
        .or_else(|| alias.and_then(|alias| groups.get(alias)))
}

fn check_unit_interval(field: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "[0, 1]",
        })
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected: ">= 0",
        })
    }
}
