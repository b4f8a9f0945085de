//! Manual ingestion: PDF pages → chunks → embeddings → chunk store.
//!
//! Re-indexing is idempotent: chunks from the same source file are deleted
//! before the replacement batch is inserted.

use std::sync::Arc;

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::processing::{pdf, TextChunker};
use crate::providers::EmbeddingProvider;
use crate::registry::{ManualDefinition, ManualRegistry};
use crate::storage::ManualStore;
use crate::types::ChunkRecord;

/// Outcome of indexing a single manual.
#[derive(Debug, Clone)]
pub struct IndexReport {
    pub title: String,
    pub chunks_indexed: usize,
    pub skipped: bool,
    pub error: Option<String>,
}

pub struct ManualIndexer {
    store: Arc<ManualStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    chunker: TextChunker,
}

impl ManualIndexer {
    pub fn new(
        store: Arc<ManualStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        chunking: &ChunkingConfig,
    ) -> Self {
        Self {
            store,
            embeddings,
            chunker: TextChunker::new(
                chunking.chunk_size,
                chunking.chunk_overlap,
                chunking.min_chunk_size,
            ),
        }
    }

    /// Index one manual end to end.
    pub async fn index_manual(&self, manual: &ManualDefinition) -> Result<IndexReport> {
        let source = manual.pdf_path.display().to_string();

        let extracted = pdf::extract_manual(&manual.pdf_path)
            .with_context(|| format!("failed to extract {}", manual.title))?;

        let chunks = self.chunker.chunk(&extracted.text);
        if chunks.is_empty() {
            tracing::warn!(title = %manual.title, "manual produced no chunks");
            return Ok(IndexReport {
                title: manual.title.clone(),
                chunks_indexed: 0,
                skipped: false,
                error: None,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embeddings
            .embed_documents(&texts)
            .await
            .context("failed to embed manual chunks")?;

        let now = chrono::Utc::now().timestamp();
        let records: Vec<ChunkRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkRecord {
                id: Uuid::new_v4().to_string(),
                source: source.clone(),
                title: manual.title.clone(),
                equipment_type: manual.equipment_type.clone(),
                equipment_brand: manual.equipment_brand.clone(),
                equipment_model: manual.equipment_model.clone(),
                manual_type: manual.manual_type.clone(),
                page_number: extracted.page_for_offset(chunk.start_offset),
                chunk_index: chunk.index,
                text: chunk.text.clone(),
                vector,
                created_at: now,
            })
            .collect();

        // Replace, never accumulate: stale chunks from a previous run of the
        // same file are removed first.
        self.store.delete_by_source(&source).await.ok();
        self.store.upsert_chunks(records).await?;

        tracing::info!(
            title = %manual.title,
            chunks = chunks.len(),
            "indexed manual"
        );

        Ok(IndexReport {
            title: manual.title.clone(),
            chunks_indexed: chunks.len(),
            skipped: false,
            error: None,
        })
    }

    /// Index every available manual in the registry. Missing files are
    /// reported and skipped; one broken manual does not abort the rest.
    pub async fn index_registry(
        &self,
        registry: &ManualRegistry,
        reset: bool,
    ) -> Result<Vec<IndexReport>> {
        if reset {
            self.store.clear().await.context("failed to reset store")?;
        }

        let mut reports = Vec::new();

        for manual in registry.all() {
            if !manual.exists() {
                tracing::warn!(
                    title = %manual.title,
                    path = %manual.pdf_path.display(),
                    "manual PDF missing, skipping"
                );
                reports.push(IndexReport {
                    title: manual.title.clone(),
                    chunks_indexed: 0,
                    skipped: true,
                    error: None,
                });
                continue;
            }

            match self.index_manual(manual).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(title = %manual.title, error = %e, "failed to index manual");
                    reports.push(IndexReport {
                        title: manual.title.clone(),
                        chunks_indexed: 0,
                        skipped: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(reports)
    }
}
