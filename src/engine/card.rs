//! Normalizing raw server items into the engine's working unit.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::rating::Rating;

/// One flashcard instance tracked within a session's queue.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    /// Session-stable identity: the progress id, falling back to the word id.
    pub key: String,
    pub word_id: String,
    /// Opaque display payload (term, translation, ...).
    pub word: Value,
    pub progress_id: Option<String>,
    pub session_repetition: u32,
    pub last_rating: Option<Rating>,
}

impl CardRecord {
    /// Build a card from one `items[]` entry. Returns `None` when the item carries
    /// neither a word identifier nor a progress identifier.
    pub fn from_raw(raw: &Value) -> Option<Self> {
        let nested = raw.get("word").filter(|w| w.is_object());
        let word = nested.unwrap_or(raw);

        let word_id = id_field(word, "id")
            .or_else(|| id_field(word, "_id"))
            .or_else(|| id_field(raw, "wordId"))
            .or_else(|| id_field(raw, "id"));

        let progress_id = id_field(raw, "progressId")
            .or_else(|| raw.get("progress").and_then(|p| id_field(p, "id")))
            .or_else(|| nested.and_then(|_| id_field(raw, "_id")));

        let Some(key) = progress_id.clone().or_else(|| word_id.clone()) else {
            warn!(target: "engine", "Dropping queue item without word or progress id");
            return None;
        };
        let word_id = word_id.unwrap_or_else(|| key.clone());

        Some(Self {
            key,
            word_id,
            word: word.clone(),
            progress_id,
            session_repetition: 0,
            last_rating: None,
        })
    }

    /// The variant placed back in the queue after a non-graduating verdict.
    pub fn requeued(&self, rating: Rating) -> Self {
        Self {
            session_repetition: self.session_repetition + 1,
            last_rating: Some(rating),
            ..self.clone()
        }
    }
}

/// Read an identifier that may be a string or an integer.
fn id_field(v: &Value, field: &str) -> Option<String> {
    match v.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalize a page of raw items, dropping the unusable ones.
pub fn cards_from_items(items: &[Value]) -> Vec<CardRecord> {
    items.iter().filter_map(CardRecord::from_raw).collect()
}
