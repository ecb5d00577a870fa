use crate::config::ConfigError;
use crate::dataset::DataError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecommenderError>;

#[derive(Debug, Error)]
pub enum RecommenderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("{component} must be trained first. Call {required} before {operation}.")]
    NotTrained {
        component: &'static str,
        required: &'static str,
        operation: &'static str,
    },
}

impl RecommenderError {
    pub fn not_trained(
        component: &'static str,
        required: &'static str,
        operation: &'static str,
    ) -> Self {
        RecommenderError::NotTrained {
            component,
            required,
            operation,
        }
    }

    pub fn is_not_trained(&self) -> bool {
        matches!(self, RecommenderError::NotTrained { .. })
    }
}
