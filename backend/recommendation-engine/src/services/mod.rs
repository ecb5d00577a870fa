pub mod context;
pub mod diversity;
pub mod features;
pub mod integration;
pub mod popularity;
pub mod profile_builder;

pub use context::ContextEngine;
pub use diversity::DiversityLayer;
pub use integration::IntegrationModule;
pub use popularity::{GlobalPopularityRanking, ItemCatalog};
pub use profile_builder::BehavioralProfiler;
