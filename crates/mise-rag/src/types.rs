use serde::{Deserialize, Serialize};

/// A passage returned by the similarity search provider. Immutable once
/// produced; `score` is cosine similarity derived as `1 - distance`,
/// clamped to be non-negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub content: String,
    pub score: f32,
    pub metadata: PassageMetadata,
}

/// Per-passage metadata with explicit optional fields. Absent labels are
/// `None` rather than sentinel strings scattered across call sites; `source`
/// defaults to "unknown".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassageMetadata {
    pub equipment_type: Option<String>,
    pub equipment_brand: Option<String>,
    pub title: Option<String>,
    pub source: String,
    pub page_number: Option<u32>,
    pub chunk_index: u32,
}

impl Default for PassageMetadata {
    fn default() -> Self {
        Self {
            equipment_type: None,
            equipment_brand: None,
            title: None,
            source: "unknown".to_string(),
            page_number: None,
            chunk_index: 0,
        }
    }
}

/// The equipment identity attributed to an ongoing conversation.
///
/// Empty at conversation start, overwritten after each turn that resolves a
/// primary equipment, cleared when the user resets context. A lock set from
/// a clear voting winner propagates unchanged into the next turn unless the
/// new message is classified as a new topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EquipmentLock {
    pub brand: Option<String>,
    pub equipment_type: Option<String>,
    pub title: Option<String>,
}

impl EquipmentLock {
    /// A lock participates in retrieval filtering when brand or type is set.
    pub fn is_locked(&self) -> bool {
        self.brand.is_some() || self.equipment_type.is_some()
    }
}

/// Short conversational context carried between turns. Owned exclusively by
/// the caller (CLI / chat UI); the engine reads it and returns a new lock,
/// never persisting anything itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    pub last_question: String,
    pub last_answer: String,
    pub last_brand: Option<String>,
    pub last_equipment_type: Option<String>,
    pub last_manual_title: Option<String>,
}

impl ConversationContext {
    pub fn has_prior_question(&self) -> bool {
        !self.last_question.trim().is_empty()
    }

    /// Roll a completed turn into the context offered to the next turn.
    pub fn advance(&mut self, question: &str, answer: &str, lock: &EquipmentLock) {
        self.last_question = question.to_string();
        self.last_answer = answer.to_string();
        self.last_brand = lock.brand.clone();
        self.last_equipment_type = lock.equipment_type.clone();
        self.last_manual_title = lock.title.clone();
    }

    /// Explicit context reset ("clear chat history").
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Equality constraints passed to the similarity search provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EquipmentFilter {
    pub brand: Option<String>,
    pub equipment_type: Option<String>,
}

impl EquipmentFilter {
    pub fn is_empty(&self) -> bool {
        self.brand.is_none() && self.equipment_type.is_none()
    }
}

/// Result of one engine query: the generated answer (with references
/// appended), the passages it was grounded on, and the lock offered to the
/// next turn.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub answer: String,
    pub passages: Vec<RetrievedPassage>,
    pub resolved_lock: EquipmentLock,
    pub followup: bool,
}

/// Storage row for one indexed manual chunk.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub source: String,
    pub title: String,
    pub equipment_type: String,
    pub equipment_brand: String,
    pub equipment_model: String,
    pub manual_type: String,
    pub page_number: u32,
    pub chunk_index: u32,
    pub text: String,
    pub vector: Vec<f32>,
    pub created_at: i64,
}
