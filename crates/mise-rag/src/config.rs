use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub data_dir: PathBuf,
    pub api: ApiConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub conversation: ConversationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Read from OPENAI_API_KEY when absent from the config file.
    #[serde(default)]
    pub api_key: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub embedding_cache_size: usize,
    /// OpenAI-compatible base URL, overridable for proxies and local servers.
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Base passage count per query; scaled up for multi-part questions.
    pub top_k: usize,
    /// Floor for the broad stage-1 candidate pool.
    pub stage1_min: usize,
    /// How many ranked passages participate in equipment voting.
    pub vote_top_n: usize,
    /// Fraction of rank-weighted votes the winner needs before the
    /// orchestrator re-searches with an equipment filter. Policy parameter,
    /// not a load-bearing invariant.
    pub dominance_threshold: f32,
    /// Cap on passages handed to the generation collaborator.
    pub context_max_passages: usize,
    /// Cap on passages considered for the reference section.
    pub citation_max_passages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Messages at or below this word count are treated as follow-ups.
    /// Policy parameter, not a load-bearing invariant.
    pub followup_max_words: usize,
}

impl AssistantConfig {
    /// Validate config values, returning errors for clearly broken
    /// configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.api.embedding_dimension == 0 {
            return Err("api.embedding_dimension must be > 0".into());
        }
        if self.chunking.chunk_size < 50 {
            return Err("chunking.chunk_size must be >= 50".into());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err("chunking.chunk_overlap must be < chunk_size".into());
        }
        if self.retrieval.top_k == 0 {
            return Err("retrieval.top_k must be > 0".into());
        }
        if self.retrieval.vote_top_n == 0 {
            return Err("retrieval.vote_top_n must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.retrieval.dominance_threshold) {
            return Err("retrieval.dominance_threshold must be in [0.0, 1.0]".into());
        }
        if self.conversation.followup_max_words == 0 {
            return Err("conversation.followup_max_words must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file. The API key falls back to the
    /// OPENAI_API_KEY environment variable when the file leaves it empty.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        if config.api.api_key.is_empty() {
            config.api.api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        }
        config.validate()?;
        Ok(config)
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mise-rag");

        Self {
            data_dir,
            api: ApiConfig {
                api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
                chat_model: "gpt-4o-mini".to_string(),
                embedding_model: "text-embedding-3-small".to_string(),
                embedding_dimension: 1536,
                embedding_cache_size: 256,
                base_url: "https://api.openai.com/v1".to_string(),
            },
            chunking: ChunkingConfig {
                chunk_size: 1000,
                chunk_overlap: 200,
                min_chunk_size: 100,
            },
            retrieval: RetrievalConfig {
                top_k: 8,
                stage1_min: 16,
                vote_top_n: 12,
                dominance_threshold: 0.6,
                context_max_passages: 12,
                citation_max_passages: 5,
            },
            conversation: ConversationConfig {
                followup_max_words: 6,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AssistantConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_overlap_larger_than_chunk() {
        let mut config = AssistantConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_dominance() {
        let mut config = AssistantConfig::default();
        config.retrieval.dominance_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
