//! Session state threaded through the pipeline stages.
//!
//! A `SessionState` is created per request, passed by value from stage to
//! stage and discarded once the run emits its answer.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::emotion::Emotion;
use super::generator::GenerationOutcome;
use super::retrieval::Passage;
use super::screening::Phq9Score;
use crate::models::AssessmentResult;

/// Sentinel rendered when the user has no stored assessment.
pub const NO_PRIOR_SESSION: &str = "이전 세션 정보 없음";

/// Inbound pipeline request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: i64,
    pub conversation_id: i64,
    pub user_input: String,
    #[serde(default)]
    pub phq9_suggested: bool,
}

/// Outbound pipeline response. Only `answer` is part of the wire contract;
/// the caller reads `phq9_suggested` to persist it for the next turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    #[serde(skip)]
    pub phq9_suggested: bool,
}

/// Latest stored clinical score for the user, or nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClinicalContext {
    #[default]
    NoPriorSession,
    Assessment {
        score: u8,
        band_label: &'static str,
        updated_at: NaiveDateTime,
    },
}

impl ClinicalContext {
    pub fn from_assessment(result: Option<AssessmentResult>) -> Self {
        match result {
            Some(r) => Self::Assessment {
                score: r.score,
                band_label: r.band.label(),
                updated_at: r.updated_at,
            },
            None => Self::NoPriorSession,
        }
    }

    /// Single-line summary for the prompt.
    pub fn render(&self) -> String {
        match self {
            Self::NoPriorSession => NO_PRIOR_SESSION.to_string(),
            Self::Assessment {
                score,
                band_label,
                updated_at,
            } => format!(
                "PHQ-9 점수: {score}점 ({band_label}, {})",
                updated_at.format("%Y-%m-%d %H:%M")
            ),
        }
    }
}

/// Mutable record owned by one pipeline run.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub user_id: i64,
    pub conversation_id: i64,
    pub user_input: String,
    /// Role-prefixed lines, oldest first.
    pub chat_history: Vec<String>,
    pub clinical_context: ClinicalContext,
    pub passages: Vec<Passage>,
    pub emotion: Option<Emotion>,
    pub depressed: bool,
    /// Working answer; citations and screening text are appended in place.
    pub answer: String,
    pub generation: Option<GenerationOutcome>,
    pub score: Option<Phq9Score>,
    pub phq9_suggested: bool,
}

impl SessionState {
    pub fn new(user_id: i64, conversation_id: i64, user_input: &str, phq9_suggested: bool) -> Self {
        Self {
            user_id,
            conversation_id,
            user_input: user_input.to_string(),
            chat_history: Vec::new(),
            clinical_context: ClinicalContext::NoPriorSession,
            passages: Vec::new(),
            emotion: None,
            depressed: false,
            answer: String::new(),
            generation: None,
            score: None,
            phq9_suggested,
        }
    }

    pub fn from_request(request: &ChatRequest) -> Self {
        Self::new(
            request.user_id,
            request.conversation_id,
            &request.user_input,
            request.phq9_suggested,
        )
    }

    /// Passage texts joined with blank lines.
    pub fn grounding_context(&self) -> String {
        self.passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// One label per passage, in retrieval order.
    pub fn citation_labels(&self) -> Vec<&str> {
        self.passages.iter().map(|p| p.citation_label()).collect()
    }

    /// Provider whose text ended up in the answer, if any.
    pub fn provider_used(&self) -> Option<&str> {
        self.generation.as_ref().and_then(|g| g.provider())
    }

    /// Error detail recorded by the generator, if any attempt failed.
    pub fn error_detail(&self) -> Option<String> {
        self.generation.as_ref().and_then(|g| g.error_detail())
    }

    pub fn fallback_used(&self) -> bool {
        self.generation.as_ref().is_some_and(|g| g.fallback_used())
    }

    pub fn into_response(self) -> ChatResponse {
        ChatResponse {
            answer: self.answer,
            phq9_suggested: self.phq9_suggested,
        }
    }
}
