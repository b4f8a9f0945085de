pub mod answer;
pub mod config;
pub mod context;
pub mod engine;
pub mod indexing;
pub mod processing;
pub mod providers;
pub mod registry;
pub mod retrieval;
pub mod storage;
pub mod types;

// Re-export primary types for convenience
pub use config::AssistantConfig;
pub use engine::AssistantEngine;
pub use indexing::{IndexReport, ManualIndexer};
pub use registry::{ManualDefinition, ManualRegistry};
pub use types::{
    ConversationContext, EquipmentFilter, EquipmentLock, PassageMetadata, QueryOutcome,
    RetrievedPassage,
};

// Re-export common types
pub use anyhow::{Error, Result};
