//! OpenAI-compatible API client covering both collaborator roles the engine
//! delegates outward: chat-completion answer generation and text embeddings.
//! Works against any endpoint speaking the OpenAI wire format via
//! `api.base_url`.

use std::num::NonZeroUsize;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{AnswerGenerator, EmbeddingProvider, ProviderError};
use crate::answer::prompts;
use crate::config::ApiConfig;

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    embedding_dimension: usize,
    /// Query-embedding cache: follow-up turns re-embed near-identical
    /// queries, and the composed "<prior>\nFollow-up: ..." strings repeat
    /// within a session.
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiClient {
    pub fn new(api: &ApiConfig) -> Result<Self> {
        if api.api_key.is_empty() {
            return Err(anyhow!(
                "no API key configured; set OPENAI_API_KEY or api.api_key in the config file"
            ));
        }

        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(ProviderError::Transport)?;

        let cache_size =
            NonZeroUsize::new(api.embedding_cache_size.max(1)).expect("cache size is non-zero");

        tracing::info!(
            chat_model = %api.chat_model,
            embedding_model = %api.embedding_model,
            base_url = %api.base_url,
            "created OpenAI-compatible client"
        );

        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            api_key: api.api_key.clone(),
            chat_model: api.chat_model.clone(),
            embedding_model: api.embedding_model.clone(),
            embedding_dimension: api.embedding_dimension,
            query_cache: Mutex::new(LruCache::new(cache_size)),
        })
    }

    /// Parse a response body as JSON, surfacing a clear error when the
    /// server returned an HTML error page (gateways sometimes do, even with
    /// status 200) instead of valid JSON.
    async fn parse_json_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await.map_err(ProviderError::Transport)?;

        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(ProviderError::MalformedResponse {
                endpoint: endpoint.to_string(),
                reason: format!("HTML instead of JSON (HTTP {}): {}", status, preview),
            }
            .into());
        }

        if !status.is_success() {
            let preview: String = body.chars().take(300).collect();
            return Err(ProviderError::Api {
                provider: "openai".to_string(),
                status: status.as_u16(),
                message: preview,
            }
            .into());
        }

        serde_json::from_str::<T>(&body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            ProviderError::MalformedResponse {
                endpoint: endpoint.to_string(),
                reason: format!("{} (body: {})", e, preview),
            }
            .into()
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let endpoint = format!("{}/embeddings", self.base_url);

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.embedding_model,
                "input": texts,
            }))
            .send()
            .await
            .map_err(ProviderError::Transport)?;

        let parsed: EmbeddingResponse = Self::parse_json_response(response, &endpoint).await?;

        if parsed.data.len() != texts.len() {
            return Err(ProviderError::MalformedResponse {
                endpoint,
                reason: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    parsed.data.len()
                ),
            }
            .into());
        }

        // The API documents response order matching input order, but also
        // carries an explicit index; trust the index.
        let mut ordered = parsed.data;
        ordered.sort_by_key(|d| d.index);
        Ok(ordered.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiClient {
    async fn generate_answer(
        &self,
        system_instructions: &str,
        context_passages: &[String],
        question: &str,
    ) -> Result<String> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        let user_message = prompts::build_user_message(context_passages, question);

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.chat_model,
                "temperature": 0.0,
                "max_tokens": 3000,
                "messages": [
                    { "role": "system", "content": system_instructions },
                    { "role": "user", "content": user_message },
                ],
            }))
            .send()
            .await
            .map_err(ProviderError::Transport)?;

        let parsed: ChatCompletionResponse =
            Self::parse_json_response(response, &endpoint).await?;

        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| ProviderError::MalformedResponse {
                endpoint,
                reason: "no choices in completion response".to_string(),
            })?;

        Ok(answer)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.query_cache.lock().get(text) {
            return Ok(cached.clone());
        }

        let input = [text.to_string()];
        let mut embeddings = self.embed_batch(&input).await?;
        let embedding = embeddings
            .pop()
            .ok_or_else(|| anyhow!("embedding batch returned empty"))?;

        self.query_cache
            .lock()
            .put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Batch requests the way the indexer batches inserts; large manuals
        // produce hundreds of chunks and a single request would hit payload
        // limits.
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(100) {
            all.extend(self.embed_batch(batch).await?);
        }
        Ok(all)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }
}
