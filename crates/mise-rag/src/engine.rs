//! Assistant engine: the synchronous per-question pipeline.
//!
//! classify → retrieve (one or two search calls) → assemble references →
//! generate. Every stage completes best-effort; only infrastructure failures
//! from the search or generation collaborators surface as errors.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::answer::{self, prompts};
use crate::config::AssistantConfig;
use crate::context::ContextTracker;
use crate::providers::{
    AnswerGenerator, OpenAiClient, SearchProvider, StoreSearchProvider,
};
use crate::retrieval::orchestrator::{RetrievalOrchestrator, RetrievalPolicy};
use crate::storage::ManualStore;
use crate::types::{ConversationContext, EquipmentLock, QueryOutcome};

pub struct AssistantEngine {
    tracker: ContextTracker,
    orchestrator: RetrievalOrchestrator,
    generator: Arc<dyn AnswerGenerator>,
    context_max_passages: usize,
    citation_max_passages: usize,
}

impl AssistantEngine {
    /// Wire the engine from explicit collaborators. Nothing global: the
    /// search provider and generator are owned dependencies.
    pub fn new(
        config: &AssistantConfig,
        search: Arc<dyn SearchProvider>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Self {
        let policy = RetrievalPolicy {
            base_top_k: config.retrieval.top_k,
            stage1_min: config.retrieval.stage1_min,
            vote_top_n: config.retrieval.vote_top_n,
            dominance_threshold: config.retrieval.dominance_threshold,
        };

        Self {
            tracker: ContextTracker::new(config.conversation.followup_max_words),
            orchestrator: RetrievalOrchestrator::new(search, policy),
            generator,
            context_max_passages: config.retrieval.context_max_passages,
            citation_max_passages: config.retrieval.citation_max_passages,
        }
    }

    /// Convenience constructor: Lance store + OpenAI-compatible client for
    /// both embeddings and generation.
    pub async fn open(config: &AssistantConfig) -> Result<Self> {
        config.validate().map_err(anyhow::Error::msg)?;

        let client = Arc::new(OpenAiClient::new(&config.api)?);

        let store_path = config.data_dir.join("lance_data");
        let store = Arc::new(
            ManualStore::new(
                store_path.to_str().unwrap_or("./lance_data"),
                config.api.embedding_dimension,
            )
            .await
            .context("Failed to initialize chunk store")?,
        );

        let search: Arc<dyn SearchProvider> =
            Arc::new(StoreSearchProvider::new(store, client.clone()));

        Ok(Self::new(config, search, client))
    }

    /// Answer one question in the context of an ongoing conversation.
    ///
    /// `prior` is owned by the caller; the returned lock is what the caller
    /// should roll into the next turn's context. `followup_override` forces
    /// the classification when the frontend already knows better.
    pub async fn query(
        &self,
        question: &str,
        prior: &ConversationContext,
        followup_override: Option<bool>,
    ) -> Result<QueryOutcome> {
        let is_followup = followup_override
            .unwrap_or_else(|| self.tracker.classify_turn(question, prior));

        let lock = if is_followup {
            self.tracker.followup_lock(prior)
        } else {
            EquipmentLock::default()
        };

        let retrieval_query = self
            .tracker
            .compose_retrieval_query(question, prior, is_followup);

        tracing::info!(
            followup = is_followup,
            locked = lock.is_locked(),
            "processing question"
        );

        let retrieval = self.orchestrator.retrieve(&retrieval_query, &lock).await?;

        // No grounding available: skip the generation collaborator entirely
        // rather than asking it to answer from nothing.
        if retrieval.passages.is_empty() {
            tracing::warn!("retrieval produced no passages, returning ungrounded fallback");
            return Ok(QueryOutcome {
                answer: prompts::NO_GROUNDING_ANSWER.to_string(),
                passages: Vec::new(),
                resolved_lock: EquipmentLock::default(),
                followup: is_followup,
            });
        }

        let context_passages: Vec<String> = retrieval
            .passages
            .iter()
            .take(self.context_max_passages)
            .map(|p| p.content.clone())
            .collect();

        // Generation sees the user's original question; the composed
        // retrieval query exists only for the similarity search.
        let mut answer = self
            .generator
            .generate_answer(prompts::SYSTEM_PROMPT, &context_passages, question)
            .await
            .context("answer generation failed")?;

        if let Some(references) =
            answer::build_references(&retrieval.passages, self.citation_max_passages)
        {
            answer.push_str(&references);
        }

        Ok(QueryOutcome {
            answer,
            passages: retrieval.passages,
            resolved_lock: retrieval.lock,
            followup: is_followup,
        })
    }
}
