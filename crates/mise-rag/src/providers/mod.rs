//! External collaborator interfaces: similarity search, answer generation,
//! and embeddings. The engine only ever talks to these traits; concrete
//! clients are injected at construction time rather than reached through
//! process-wide singletons.

pub mod openai;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::storage::ManualStore;
use crate::types::{EquipmentFilter, RetrievedPassage};

pub use openai::OpenAiClient;

/// Infrastructure failures from external collaborators. These propagate to
/// the caller, unlike the recoverable retrieval steady states (empty index,
/// ambiguous equipment) which never surface as errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{provider} returned HTTP {status}: {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },
}

/// Similarity search over the indexed manuals: ranked passages, best-effort
/// ordered by descending similarity, optionally constrained to a brand
/// and/or equipment type.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&EquipmentFilter>,
    ) -> Result<Vec<RetrievedPassage>>;
}

/// Grounded prose generation from retrieved passages.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate_answer(
        &self,
        system_instructions: &str,
        context_passages: &[String],
        question: &str,
    ) -> Result<String>;
}

/// Text embedding for queries and document chunks.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
}

/// [`SearchProvider`] backed by the Lance chunk store plus an embedding
/// collaborator.
///
/// Filtered searches relax on empty results (strict brand+type, then
/// type-only, then unfiltered) so a filter that matches nothing degrades to
/// broader context instead of an empty answer.
pub struct StoreSearchProvider {
    store: Arc<ManualStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl StoreSearchProvider {
    pub fn new(store: Arc<ManualStore>, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embeddings }
    }
}

#[async_trait]
impl SearchProvider for StoreSearchProvider {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&EquipmentFilter>,
    ) -> Result<Vec<RetrievedPassage>> {
        let query_vector = self.embeddings.embed_query(query).await?;

        let filter = filter.cloned().unwrap_or_default();

        let passages = self
            .store
            .vector_search(&query_vector, top_k, Some(&filter))
            .await?;
        if !passages.is_empty() || filter.is_empty() {
            return Ok(passages);
        }

        if filter.brand.is_some() && filter.equipment_type.is_some() {
            tracing::debug!("no results for brand+type filter, retrying type-only");
            let type_only = EquipmentFilter {
                brand: None,
                equipment_type: filter.equipment_type.clone(),
            };
            let passages = self
                .store
                .vector_search(&query_vector, top_k, Some(&type_only))
                .await?;
            if !passages.is_empty() {
                return Ok(passages);
            }
        }

        tracing::debug!("no results under filters, retrying unfiltered");
        self.store.vector_search(&query_vector, top_k, None).await
    }
}
