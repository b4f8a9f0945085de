//! Conversation Context Tracker
//!
//! Decides whether an incoming message continues the previous turn's
//! equipment context (a follow-up) or starts a new topic, and derives the
//! retrieval query and equipment lock for follow-up turns.
//!
//! The brand and equipment-type keyword tables live here and nowhere else;
//! the retrieval layer and the CLI both consume them through this module so
//! the two layers cannot drift apart.

use std::sync::LazyLock;

use crate::types::{ConversationContext, EquipmentLock};

/// Keyword → canonical brand. Ordered: the first matching keyword wins.
pub const BRAND_KEYWORDS: &[(&str, &str)] = &[
    ("square", "Square"),
    ("clover", "Clover"),
    ("oracle", "Oracle"),
    ("micros", "Oracle"),
    ("lucas", "Oracle"),
    ("metos", "Metos"),
    ("la marzocco", "La Marzocco"),
    ("vulcan", "Vulcan"),
    ("lincoln", "Lincoln"),
    ("pitco", "Pitco"),
    ("manitowoc", "Manitowoc"),
    ("v400m", "V400m"),
    ("adyen", "V400m"),
];

/// Equipment type → trigger keywords. Ordered: the first matching type wins.
pub const EQUIPMENT_TYPE_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "POS",
        &[
            "pos",
            "terminal",
            "payment",
            "refund",
            "void",
            "transaction",
            "totals",
            "receipt",
            "merchant",
            "card",
            "paper roll",
        ],
    ),
    (
        "Coffee_Maker",
        &["coffee maker", "coffee machine", "brew", "descale", "carafe"],
    ),
    ("Espresso_Machine", &["espresso", "steam wand", "portafilter"]),
    (
        "Fryer",
        &["fryer", "fry", "oil", "basket", "boil out", "boil-out", "filtering"],
    ),
    ("Pizza_Oven", &["pizza oven", "impinger"]),
    (
        "Oven",
        &["oven", "convection", "bake", "broil", "thermostat", "roast"],
    ),
    ("Ice_Machine", &["ice machine", "ice maker"]),
];

/// Brand → the equipment type its manual covers. Used to backfill a missing
/// type when a follow-up lock only knows the brand.
pub const BRAND_TO_TYPE: &[(&str, &str)] = &[
    ("Square", "POS"),
    ("Clover", "POS"),
    ("Oracle", "POS"),
    ("V400m", "POS"),
    ("Metos", "Coffee_Maker"),
    ("La Marzocco", "Espresso_Machine"),
    ("Vulcan", "Oven"),
    ("Lincoln", "Pizza_Oven"),
    ("Pitco", "Fryer"),
    ("Manitowoc", "Ice_Machine"),
];

/// Surface patterns that mark a message as continuing the previous topic:
/// affirmations, pronoun-leading clauses, power-state phrases, status words,
/// first-person trouble reports, error mentions.
static FOLLOWUP_PATTERNS: LazyLock<Vec<regex::Regex>> = LazyLock::new(|| {
    [
        r"^(yes|no|yeah|yep|nope|ok|okay|done|cool|sure)\b",
        r"^(it|this|that|he|she|they)\b",
        r"\b(it is|it's)\b",
        r"\b(power(ed)?\s+(on|off)|turn(ed)?\s+(on|off))\b",
        r"\b(blinking|flashing|solid)\b",
        r"\b(not\s+connected|connected)\b",
        r"\b(i did|i tried|i can't|i cannot|i see|i don't|i do not)\b",
        r"\b(error|code|message)\b",
    ]
    .iter()
    .map(|p| regex::Regex::new(p).expect("follow-up pattern is valid"))
    .collect()
});

/// Detect an explicit brand or equipment-type mention in free text.
/// Case-insensitive substring match; first match per table wins.
pub fn detect_equipment(text: &str) -> (Option<&'static str>, Option<&'static str>) {
    let lower = text.to_lowercase();

    let brand = BRAND_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, brand)| *brand);

    let equipment_type = EQUIPMENT_TYPE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(equipment_type, _)| *equipment_type);

    (brand, equipment_type)
}

/// Infer a brand from free text via the shared keyword table.
pub fn infer_brand(text: &str) -> Option<&'static str> {
    detect_equipment(text).0
}

/// The equipment type a brand's manual covers, if the brand is known.
pub fn brand_default_type(brand: &str) -> Option<&'static str> {
    BRAND_TO_TYPE
        .iter()
        .find(|(b, _)| *b == brand)
        .map(|(_, equipment_type)| *equipment_type)
}

/// Classifies turns and composes retrieval queries from the previous turn's
/// context.
#[derive(Debug, Clone)]
pub struct ContextTracker {
    followup_max_words: usize,
}

impl ContextTracker {
    pub fn new(followup_max_words: usize) -> Self {
        Self { followup_max_words }
    }

    /// Is `message` a follow-up to the previous turn, or a new topic?
    ///
    /// Rules, first match wins:
    /// 1. empty message or no prior question → new topic
    /// 2-4. an explicit brand or type differing from the prior turn's → new topic
    /// 5. an explicit brand/type against an unlabeled prior context → new topic
    /// 6. short message → follow-up
    /// 7. follow-up surface pattern without any explicit equipment → follow-up
    /// 8. otherwise → new topic
    pub fn classify_turn(&self, message: &str, prior: &ConversationContext) -> bool {
        if message.trim().is_empty() || !prior.has_prior_question() {
            return false;
        }

        let trimmed = message.trim().to_lowercase();
        let (detected_brand, detected_type) = detect_equipment(message);

        if let (Some(brand), Some(last_brand)) = (detected_brand, prior.last_brand.as_deref()) {
            if brand != last_brand {
                tracing::debug!(from = last_brand, to = brand, "brand changed, new topic");
                return false;
            }
        }

        if let (Some(equipment_type), Some(last_type)) =
            (detected_type, prior.last_equipment_type.as_deref())
        {
            if equipment_type != last_type {
                tracing::debug!(from = last_type, to = equipment_type, "type changed, new topic");
                return false;
            }
        }

        // A first explicit mention never continues an unlabeled context.
        if (detected_brand.is_some() || detected_type.is_some())
            && prior.last_brand.is_none()
            && prior.last_equipment_type.is_none()
        {
            return false;
        }

        if trimmed.split_whitespace().count() <= self.followup_max_words {
            return true;
        }

        if detected_brand.is_none()
            && detected_type.is_none()
            && FOLLOWUP_PATTERNS.iter().any(|p| p.is_match(&trimmed))
        {
            return true;
        }

        // No rule matched with certainty; default to a new topic.
        tracing::debug!(message = %message, "turn classification indeterminate, assuming new topic");
        false
    }

    /// Retrieval query for this turn. Follow-ups are prefixed with the prior
    /// question so the similarity search sees the lexical context the short
    /// message omits.
    pub fn compose_retrieval_query(
        &self,
        message: &str,
        prior: &ConversationContext,
        is_followup: bool,
    ) -> String {
        if is_followup && prior.has_prior_question() {
            format!("{}\nFollow-up: {}", prior.last_question.trim(), message)
        } else {
            message.to_string()
        }
    }

    /// The lock a follow-up turn retrieves under: stored context fields
    /// first, brand inferred from the prior question text when missing, type
    /// backfilled from the brand table when still missing.
    pub fn followup_lock(&self, prior: &ConversationContext) -> EquipmentLock {
        let brand = prior
            .last_brand
            .clone()
            .or_else(|| infer_brand(&prior.last_question).map(str::to_string));

        let equipment_type = prior.last_equipment_type.clone().or_else(|| {
            brand
                .as_deref()
                .and_then(brand_default_type)
                .map(str::to_string)
        });

        EquipmentLock {
            brand,
            equipment_type,
            title: prior.last_manual_title.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ContextTracker {
        ContextTracker::new(6)
    }

    fn context_with(brand: &str, equipment_type: &str, question: &str) -> ConversationContext {
        ConversationContext {
            last_question: question.to_string(),
            last_answer: "answer".to_string(),
            last_brand: Some(brand.to_string()),
            last_equipment_type: Some(equipment_type.to_string()),
            last_manual_title: Some("Some Manual".to_string()),
        }
    }

    #[test]
    fn no_prior_question_is_never_a_followup() {
        let prior = ConversationContext::default();
        assert!(!tracker().classify_turn("yes that worked", &prior));
    }

    #[test]
    fn different_brand_starts_a_new_topic() {
        let prior = context_with("Metos", "Coffee_Maker", "how do I descale the coffee maker?");
        assert!(!tracker().classify_turn("how do I reset my Vulcan oven", &prior));
    }

    #[test]
    fn different_type_starts_a_new_topic() {
        let prior = context_with("Metos", "Coffee_Maker", "how do I descale the coffee maker?");
        assert!(!tracker().classify_turn("what temperature should the fryer oil be set to today", &prior));
    }

    #[test]
    fn explicit_mention_without_prior_labels_is_a_new_topic() {
        let prior = ConversationContext {
            last_question: "what are the opening tasks?".to_string(),
            ..ConversationContext::default()
        };
        assert!(!tracker().classify_turn("how do I clean the espresso machine steam wand properly", &prior));
    }

    #[test]
    fn short_affirmation_is_a_followup() {
        let prior = context_with("Metos", "Coffee_Maker", "how do I descale the coffee maker?");
        assert!(tracker().classify_turn("yes that worked", &prior));
    }

    #[test]
    fn status_report_is_a_followup() {
        let prior = context_with("V400m", "POS", "how do I connect the terminal to wifi?");
        assert!(tracker().classify_turn("the light is blinking and nothing happens on screen", &prior));
    }

    #[test]
    fn long_unrelated_message_is_a_new_topic() {
        let prior = context_with("Metos", "Coffee_Maker", "how do I descale the coffee maker?");
        assert!(!tracker().classify_turn(
            "what are the recommended daily closing procedures for the kitchen staff",
            &prior
        ));
    }

    #[test]
    fn same_brand_mention_stays_a_followup_when_short() {
        let prior = context_with("Metos", "Coffee_Maker", "how do I descale the coffee maker?");
        assert!(tracker().classify_turn("the metos is leaking", &prior));
    }

    #[test]
    fn followup_query_is_prefixed_with_prior_question() {
        let prior = context_with("Metos", "Coffee_Maker", "how do I descale the coffee maker?");
        let query = tracker().compose_retrieval_query("it still shows the warning", &prior, true);
        assert_eq!(
            query,
            "how do I descale the coffee maker?\nFollow-up: it still shows the warning"
        );
    }

    #[test]
    fn new_topic_query_passes_through() {
        let prior = context_with("Metos", "Coffee_Maker", "how do I descale the coffee maker?");
        let query = tracker().compose_retrieval_query("how do I light the oven", &prior, false);
        assert_eq!(query, "how do I light the oven");
    }

    #[test]
    fn followup_lock_prefers_stored_fields() {
        let prior = context_with("Pitco", "Fryer", "how do I drain the fryer?");
        let lock = tracker().followup_lock(&prior);
        assert_eq!(lock.brand.as_deref(), Some("Pitco"));
        assert_eq!(lock.equipment_type.as_deref(), Some("Fryer"));
        assert_eq!(lock.title.as_deref(), Some("Some Manual"));
    }

    #[test]
    fn followup_lock_infers_brand_from_prior_question() {
        let prior = ConversationContext {
            last_question: "how do I reset the vulcan thermostat?".to_string(),
            last_answer: "answer".to_string(),
            ..ConversationContext::default()
        };
        let lock = tracker().followup_lock(&prior);
        assert_eq!(lock.brand.as_deref(), Some("Vulcan"));
        // Type backfilled from the brand table.
        assert_eq!(lock.equipment_type.as_deref(), Some("Oven"));
    }

    #[test]
    fn detect_equipment_first_match_wins() {
        let (brand, equipment_type) = detect_equipment("the Micros terminal shows an error");
        assert_eq!(brand, Some("Oracle"));
        assert_eq!(equipment_type, Some("POS"));
    }

    #[test]
    fn detect_equipment_is_case_insensitive() {
        let (brand, _) = detect_equipment("La Marzocco steam wand");
        assert_eq!(brand, Some("La Marzocco"));
    }
}
