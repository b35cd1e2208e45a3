use tracing::{info, warn};

use crate::answer_matching::{is_correct_option, resolve_correct_index, resolve_selected_index};
use crate::errors::ApiError;
use crate::llm_client::OpenRouterClient;
use crate::models::{FlashcardItem, McqItem, McqVerdict, StudySet};
use crate::session_store::McqSessionStore;

pub const MCQ_COUNT: usize = 10;
pub const FLASHCARD_COUNT: usize = 10;

const MCQ_INSTRUCTION: &str = "Create exactly 10 MCQs from the provided content. Each item must be: {\"question\":\"...\",\"options\":[\"A\",\"B\",\"C\",\"D\"],\"answer\":\"...\"}";
const FLASHCARD_INSTRUCTION: &str = "Create exactly 10 flashcards from the provided content. Each item must be: {\"front\":\"...\",\"back\":\"...\"}";

/// Generation orchestrator and answer verification over the session store.
#[derive(Debug, Clone)]
pub struct StudyService {
    llm: OpenRouterClient,
    sessions: McqSessionStore,
}

impl StudyService {
    pub fn new(llm: OpenRouterClient, sessions: McqSessionStore) -> Self {
        Self { llm, sessions }
    }

    /// Generate MCQs, flashcards, and a summary from source text in three
    /// concurrent provider calls, then cache the MCQ answer key. The join
    /// drains all three tasks before the first observed failure is
    /// reported, so no request is left unawaited. The returned set carries
    /// the session id, never the answer key.
    pub async fn generate_study_set(&self, source_text: &str) -> Result<StudySet, ApiError> {
        info!(
            source_length = source_text.len(),
            "Generating study set from source text"
        );

        let (mcqs, flashcards, summary) = tokio::join!(
            self.llm
                .generate_items_from_source::<McqItem>(source_text, MCQ_INSTRUCTION, MCQ_COUNT),
            self.llm.generate_items_from_source::<FlashcardItem>(
                source_text,
                FLASHCARD_INSTRUCTION,
                FLASHCARD_COUNT
            ),
            self.llm.generate_summary_from_source(source_text),
        );

        let mcqs = mcqs?;
        let flashcards = flashcards?;
        let summary = summary?;

        let mcq_set_id = self.sessions.store(mcqs.clone()).await;
        info!(
            mcq_set_id = %mcq_set_id,
            mcq_count = mcqs.len(),
            flashcard_count = flashcards.len(),
            "Study set generated"
        );

        Ok(StudySet {
            mcqs,
            flashcards,
            summary,
            mcq_set_id,
        })
    }

    /// Check a selected answer against the cached answer key.
    ///
    /// When both the correct and the selected answer resolve to option
    /// indices, correctness is positional; otherwise it falls back to
    /// letter-key/text comparison of the two answer strings.
    pub async fn verify_answer(
        &self,
        mcq_set_id: &str,
        question_index: i64,
        selected_answer: &str,
    ) -> Result<McqVerdict, ApiError> {
        let session = self
            .sessions
            .get(mcq_set_id)
            .await
            .ok_or(ApiError::SessionExpired)?;

        if question_index < 0 || question_index as usize >= session.answers.len() {
            return Err(ApiError::BadRequest(
                "questionIndex is out of range".to_string(),
            ));
        }
        let index = question_index as usize;

        let correct_answer = session.answers[index].clone();
        let options: &[String] = session
            .items
            .get(index)
            .map(|item| item.options.as_slice())
            .unwrap_or(&[]);

        let correct_index = resolve_correct_index(options, &correct_answer);
        let selected_index = resolve_selected_index(options, selected_answer);

        let is_correct = match (correct_index, selected_index) {
            (Some(correct), Some(selected)) => correct == selected,
            _ => {
                warn!(
                    mcq_set_id = %mcq_set_id,
                    question_index = index,
                    "Falling back to text comparison for answer verification"
                );
                is_correct_option(selected_answer, &correct_answer)
            }
        };

        Ok(McqVerdict {
            is_correct,
            correct_option: correct_index
                .and_then(|i| options.get(i))
                .cloned()
                .unwrap_or_default(),
            correct_index: correct_index.map(|i| i as i64).unwrap_or(-1),
            correct_answer,
            explanation: "Checked with stored answer key.".to_string(),
        })
    }

    #[cfg(test)]
    pub(crate) fn session_store(&self) -> &McqSessionStore {
        &self.sessions
    }
}
