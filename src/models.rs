use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A generated multiple-choice question. The `answer` field is the
/// authoritative correct-answer string exactly as the model returned it:
/// a bare letter ("B"), a labeled option ("B) Paris"), or the full option
/// text ("Paris"). It never reaches the client before verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McqItem {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
}

/// A generated flashcard. Passes through the pipeline unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashcardItem {
    pub front: String,
    pub back: String,
}

/// Server-side record linking a generated MCQ set to its answer key.
/// Immutable once stored; invisible once `expires_at` has passed.
#[derive(Debug, Clone)]
pub struct McqSession {
    pub id: String,
    pub items: Vec<McqItem>,
    pub answers: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// Successful response of the generate endpoint. `mcq_set_id` is the
/// bearer handle for later verification; the answer key stays server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySet {
    pub mcqs: Vec<McqItem>,
    pub flashcards: Vec<FlashcardItem>,
    pub summary: String,
    #[serde(rename = "mcqSetId")]
    pub mcq_set_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McqVerdict {
    pub is_correct: bool,
    pub correct_answer: String,
    /// Resolved index of the correct option, or -1 when the answer string
    /// could not be mapped onto any option.
    pub correct_index: i64,
    pub correct_option: String,
    pub explanation: String,
}
