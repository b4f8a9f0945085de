//! Retrieval Orchestrator
//!
//! Runs the staged retrieval protocol against the injected search provider:
//! locked vs. unlocked, single vs. multi-part question, filtered vs. mixed
//! fallback. All per-invocation state lives in a [`QueryState`] value that
//! each stage consumes and returns; nothing is shared across calls.

use std::sync::Arc;

use anyhow::Result;

use crate::providers::SearchProvider;
use crate::retrieval::voting::vote;
use crate::types::{EquipmentFilter, EquipmentLock, RetrievedPassage};

/// Policy parameters for the staged protocol. Mirrors the retrieval section
/// of the config; kept separate so the orchestrator can be driven directly
/// in tests.
#[derive(Debug, Clone)]
pub struct RetrievalPolicy {
    pub base_top_k: usize,
    pub stage1_min: usize,
    pub vote_top_n: usize,
    pub dominance_threshold: f32,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            base_top_k: 8,
            stage1_min: 16,
            vote_top_n: 12,
            dominance_threshold: 0.6,
        }
    }
}

/// Final passage list plus the lock offered to the next turn.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub passages: Vec<RetrievedPassage>,
    pub lock: EquipmentLock,
}

/// Per-invocation working state threading through the pipeline stages.
/// Created at call start, dropped at call end.
#[derive(Debug, Clone)]
struct QueryState {
    query: String,
    top_k: usize,
    lock: EquipmentLock,
}

impl QueryState {
    fn new(query: &str, lock: &EquipmentLock, policy: &RetrievalPolicy) -> Self {
        // Multi-part questions need proportionally more context: scale the
        // base count by the number of question marks when there is more than
        // one.
        let question_count = query.matches('?').count();
        let top_k = if question_count > 1 {
            policy.base_top_k * question_count
        } else {
            policy.base_top_k
        };

        Self {
            query: query.to_string(),
            top_k,
            lock: lock.clone(),
        }
    }
}

/// Primary equipment resolved from a final result set by majority vote of
/// manual title.
#[derive(Debug, Clone, Default)]
struct PrimaryManual {
    title: Option<String>,
    equipment_type: Option<String>,
    brand: Option<String>,
}

pub struct RetrievalOrchestrator {
    search: Arc<dyn SearchProvider>,
    policy: RetrievalPolicy,
}

impl RetrievalOrchestrator {
    pub fn new(search: Arc<dyn SearchProvider>, policy: RetrievalPolicy) -> Self {
        Self { search, policy }
    }

    /// Retrieve passages for `query`, honoring an existing conversation lock
    /// when one is supplied. Returns the chosen passages and the lock for
    /// the next turn; an empty result set yields an all-`None` lock ("no
    /// grounding available"), never an error.
    pub async fn retrieve(
        &self,
        query: &str,
        lock: &EquipmentLock,
    ) -> Result<RetrievalOutcome> {
        let state = QueryState::new(query, lock, &self.policy);

        if state.lock.is_locked() {
            self.locked_search(state).await
        } else {
            self.voting_search(state).await
        }
    }

    /// Locked path: one filtered search with the lock's equality constraints.
    /// Whether the lock is still appropriate was already decided by the
    /// context tracker; this path never re-evaluates it.
    async fn locked_search(&self, state: QueryState) -> Result<RetrievalOutcome> {
        tracing::debug!(
            brand = ?state.lock.brand,
            equipment_type = ?state.lock.equipment_type,
            top_k = state.top_k,
            "retrieving under conversation lock"
        );

        let filter = EquipmentFilter {
            brand: state.lock.brand.clone(),
            equipment_type: state.lock.equipment_type.clone(),
        };

        let passages = self
            .search
            .search(&state.query, state.top_k, Some(&filter))
            .await?;

        if passages.is_empty() {
            return Ok(RetrievalOutcome {
                passages,
                lock: EquipmentLock::default(),
            });
        }

        // Resolve the primary from the filtered results, falling back to the
        // lock values themselves when results carry no labels.
        let primary = pick_primary_manual(&passages);
        let lock = EquipmentLock {
            brand: state.lock.brand.clone().or(primary.brand),
            equipment_type: state.lock.equipment_type.clone().or(primary.equipment_type),
            title: primary.title,
        };

        Ok(RetrievalOutcome { passages, lock })
    }

    /// Unlocked path: broad unfiltered search, equipment vote, then either a
    /// filtered refinement search (clear winner) or the truncated mixed pool
    /// (ambiguous query).
    async fn voting_search(&self, state: QueryState) -> Result<RetrievalOutcome> {
        let stage1_k = (state.top_k * 2).max(self.policy.stage1_min);
        let pool = self.search.search(&state.query, stage1_k, None).await?;
        tracing::debug!(candidates = pool.len(), "stage 1 unfiltered search");

        let outcome = vote(&pool, self.policy.vote_top_n);

        let passages = if outcome.equipment_type.is_some()
            && outcome.dominance >= self.policy.dominance_threshold
        {
            tracing::debug!(
                equipment_type = ?outcome.equipment_type,
                dominance = outcome.dominance,
                "clear winner, re-searching with equipment filter"
            );
            let filter = EquipmentFilter {
                brand: outcome.brand.clone(),
                equipment_type: outcome.equipment_type.clone(),
            };
            self.search
                .search(&state.query, state.top_k, Some(&filter))
                .await?
        } else {
            tracing::debug!(
                dominance = outcome.dominance,
                "mixed or unlabeled results, keeping unfiltered top passages"
            );
            let mut truncated = pool;
            truncated.truncate(state.top_k);
            truncated
        };

        if passages.is_empty() {
            return Ok(RetrievalOutcome {
                passages,
                lock: EquipmentLock::default(),
            });
        }

        let primary = pick_primary_manual(&passages);
        let lock = EquipmentLock {
            brand: outcome.brand.or(primary.brand),
            equipment_type: outcome.equipment_type.or(primary.equipment_type),
            title: primary.title,
        };

        Ok(RetrievalOutcome { passages, lock })
    }
}

/// Majority vote of manual title over a result set. Tie-break: occurrence
/// count, then highest score, then lexical title order for determinism.
fn pick_primary_manual(passages: &[RetrievedPassage]) -> PrimaryManual {
    struct TitleStats {
        count: usize,
        max_score: f32,
        equipment_type: Option<String>,
        brand: Option<String>,
    }

    let mut by_title: Vec<(String, TitleStats)> = Vec::new();

    for passage in passages {
        let Some(title) = passage.metadata.title.as_deref() else {
            continue;
        };

        match by_title.iter_mut().find(|(t, _)| t == title) {
            Some((_, stats)) => {
                stats.count += 1;
                stats.max_score = stats.max_score.max(passage.score);
            }
            None => by_title.push((
                title.to_string(),
                TitleStats {
                    count: 1,
                    max_score: passage.score,
                    equipment_type: passage.metadata.equipment_type.clone(),
                    brand: passage.metadata.equipment_brand.clone(),
                },
            )),
        }
    }

    by_title
        .into_iter()
        .max_by(|(title_a, stats_a), (title_b, stats_b)| {
            stats_a
                .count
                .cmp(&stats_b.count)
                .then_with(|| {
                    stats_a
                        .max_score
                        .partial_cmp(&stats_b.max_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| title_b.cmp(title_a))
        })
        .map(|(title, stats)| PrimaryManual {
            title: Some(title),
            equipment_type: stats.equipment_type,
            brand: stats.brand,
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PassageMetadata;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records every search call so tests can assert on the staged protocol.
    struct RecordingProvider {
        calls: Mutex<Vec<(usize, Option<EquipmentFilter>)>>,
        responses: Mutex<Vec<Vec<RetrievedPassage>>>,
    }

    impl RecordingProvider {
        fn new(responses: Vec<Vec<RetrievedPassage>>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                responses: Mutex::new(responses),
            }
        }

        fn calls(&self) -> Vec<(usize, Option<EquipmentFilter>)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl SearchProvider for RecordingProvider {
        async fn search(
            &self,
            _query: &str,
            top_k: usize,
            filter: Option<&EquipmentFilter>,
        ) -> Result<Vec<RetrievedPassage>> {
            self.calls.lock().push((top_k, filter.cloned()));
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    fn passage(equipment_type: &str, brand: &str, title: &str, score: f32) -> RetrievedPassage {
        RetrievedPassage {
            content: "text".to_string(),
            score,
            metadata: PassageMetadata {
                equipment_type: Some(equipment_type.to_string()),
                equipment_brand: Some(brand.to_string()),
                title: Some(title.to_string()),
                source: "manual.pdf".to_string(),
                page_number: Some(3),
                chunk_index: 0,
            },
        }
    }

    fn coffee_pool(n: usize) -> Vec<RetrievedPassage> {
        (0..n)
            .map(|i| {
                passage(
                    "Coffee_Maker",
                    "Metos",
                    "Coffee Maker Manual",
                    0.9 - i as f32 * 0.01,
                )
            })
            .collect()
    }

    fn orchestrator(provider: Arc<RecordingProvider>) -> RetrievalOrchestrator {
        RetrievalOrchestrator::new(provider, RetrievalPolicy::default())
    }

    #[tokio::test]
    async fn multi_part_questions_scale_top_k() {
        let provider = Arc::new(RecordingProvider::new(vec![coffee_pool(20), coffee_pool(16)]));
        let orch = orchestrator(provider.clone());

        orch.retrieve(
            "how do I light the oven? and how do I bake cookies?",
            &EquipmentLock::default(),
        )
        .await
        .unwrap();

        let calls = provider.calls();
        // Stage 1 asks for max(2 * scaled, 16) = 32; stage 2 for the scaled
        // top_k of 2 questions x 8.
        assert_eq!(calls[0].0, 32);
        assert_eq!(calls[1].0, 16);
    }

    #[tokio::test]
    async fn locked_conversation_skips_the_voting_protocol() {
        let provider = Arc::new(RecordingProvider::new(vec![coffee_pool(8)]));
        let orch = orchestrator(provider.clone());

        let lock = EquipmentLock {
            brand: Some("Metos".to_string()),
            equipment_type: Some("Coffee_Maker".to_string()),
            title: Some("Coffee Maker Manual".to_string()),
        };

        let outcome = orch
            .retrieve("does it need cleaning after every shift?", &lock)
            .await
            .unwrap();

        let calls = provider.calls();
        assert_eq!(calls.len(), 1, "exactly one filtered search, no voting");
        let filter = calls[0].1.as_ref().expect("locked search must filter");
        assert_eq!(filter.brand.as_deref(), Some("Metos"));
        assert_eq!(filter.equipment_type.as_deref(), Some("Coffee_Maker"));
        assert_eq!(outcome.lock.brand.as_deref(), Some("Metos"));
    }

    #[tokio::test]
    async fn clear_winner_triggers_filtered_refinement() {
        // 9 of 12 voting passages are Coffee_Maker: a clear winner.
        let mut stage1 = coffee_pool(9);
        stage1.extend((0..3).map(|i| {
            passage(
                "Espresso_Machine",
                "La Marzocco",
                "Espresso Manual",
                0.5 - i as f32 * 0.01,
            )
        }));

        let provider = Arc::new(RecordingProvider::new(vec![stage1, coffee_pool(8)]));
        let orch = orchestrator(provider.clone());

        let outcome = orch
            .retrieve("how do I descale the machine", &EquipmentLock::default())
            .await
            .unwrap();

        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].1.is_none(), "stage 1 must be unfiltered");
        let filter = calls[1].1.as_ref().expect("stage 2 must filter");
        assert_eq!(filter.equipment_type.as_deref(), Some("Coffee_Maker"));
        assert_eq!(outcome.lock.equipment_type.as_deref(), Some("Coffee_Maker"));
        assert_eq!(outcome.lock.title.as_deref(), Some("Coffee Maker Manual"));
        assert_eq!(outcome.passages.len(), 8);
    }

    #[tokio::test]
    async fn mixed_results_keep_the_truncated_pool() {
        // Interleave two types so neither reaches the dominance threshold.
        let mut stage1 = Vec::new();
        for i in 0..16 {
            if i % 2 == 0 {
                stage1.push(passage("Oven", "Vulcan", "Vulcan Manual", 0.9 - i as f32 * 0.01));
            } else {
                stage1.push(passage("Fryer", "Pitco", "Pitco Manual", 0.9 - i as f32 * 0.01));
            }
        }

        let provider = Arc::new(RecordingProvider::new(vec![stage1]));
        let orch = orchestrator(provider.clone());

        let outcome = orch
            .retrieve("how do I clean it", &EquipmentLock::default())
            .await
            .unwrap();

        let calls = provider.calls();
        assert_eq!(calls.len(), 1, "no refinement search on mixed results");
        assert_eq!(outcome.passages.len(), 8, "pool truncated to top_k");
    }

    #[tokio::test]
    async fn unlabeled_pool_skips_refinement() {
        let stage1: Vec<_> = (0..16)
            .map(|i| RetrievedPassage {
                content: "text".to_string(),
                score: 0.9 - i as f32 * 0.01,
                metadata: PassageMetadata::default(),
            })
            .collect();

        let provider = Arc::new(RecordingProvider::new(vec![stage1]));
        let orch = orchestrator(provider.clone());

        let outcome = orch
            .retrieve("what are the opening tasks", &EquipmentLock::default())
            .await
            .unwrap();

        assert_eq!(provider.calls().len(), 1);
        assert_eq!(outcome.passages.len(), 8);
        // No labels anywhere: the lock stays empty.
        assert_eq!(outcome.lock, EquipmentLock::default());
    }

    #[tokio::test]
    async fn empty_index_yields_empty_lock() {
        let provider = Arc::new(RecordingProvider::new(vec![]));
        let orch = orchestrator(provider.clone());

        let outcome = orch
            .retrieve("how do I descale the coffee maker?", &EquipmentLock::default())
            .await
            .unwrap();

        assert!(outcome.passages.is_empty());
        assert_eq!(outcome.lock, EquipmentLock::default());
    }

    #[tokio::test]
    async fn primary_title_tie_breaks_on_max_score() {
        // Two manuals, two passages each; the higher-scoring manual wins.
        let stage1 = vec![
            passage("Oven", "Vulcan", "Vulcan Manual", 0.95),
            passage("Oven", "Vulcan", "Lincoln Manual", 0.90),
            passage("Oven", "Vulcan", "Lincoln Manual", 0.85),
            passage("Oven", "Vulcan", "Vulcan Manual", 0.80),
        ];

        let provider = Arc::new(RecordingProvider::new(vec![stage1, vec![
            passage("Oven", "Vulcan", "Vulcan Manual", 0.95),
            passage("Oven", "Vulcan", "Lincoln Manual", 0.90),
            passage("Oven", "Vulcan", "Lincoln Manual", 0.85),
            passage("Oven", "Vulcan", "Vulcan Manual", 0.80),
        ]]));
        let orch = orchestrator(provider.clone());

        let outcome = orch
            .retrieve("oven question", &EquipmentLock::default())
            .await
            .unwrap();

        assert_eq!(outcome.lock.title.as_deref(), Some("Vulcan Manual"));
    }
}
