pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{RecommenderError, Result};
pub use models::{Interaction, Prediction, RecommendationList};
pub use pipeline::{HybridPrediction, HybridRecommender};
pub use services::{BehavioralProfiler, ContextEngine, DiversityLayer, IntegrationModule};
