//! Counseling Pipeline Orchestrator.
//!
//! Runs a fixed, statically-known sequence of stages over one owned
//! `SessionState`:
//! history → clinical context → retrieve → emotion → generate → save → output.
//!
//! Stages never retry or reorder. Retrieval and emotion failures degrade
//! inside their stage; the generator turns a double provider failure into
//! answer text. Only persistence errors abort the run.

use std::sync::Arc;
use std::time::Instant;

use crate::config::{self, AppConfig};
use crate::models::enums::MessageRole;
use crate::store::{ConversationStore, SqliteConversationStore, MENTAL_AGENT};

use super::assembly::{self, BUNDLED_QUESTIONNAIRE};
use super::emotion::EmotionClassifier;
use super::generator;
use super::history;
use super::provider::{GeminiProvider, LlmProvider, OpenAiProvider, ProviderPool};
use super::retrieval::{ChromaRetriever, DocumentRetriever, OpenAiEmbedder};
use super::screening;
use super::state::{ChatRequest, ChatResponse, SessionState};
use super::PipelineError;

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    History,
    ClinicalContext,
    Retrieve,
    Emotion,
    Generate,
    Save,
    Output,
}

impl Stage {
    /// Execution order. Every run visits every stage exactly once.
    pub const ORDER: [Stage; 7] = [
        Stage::History,
        Stage::ClinicalContext,
        Stage::Retrieve,
        Stage::Emotion,
        Stage::Generate,
        Stage::Save,
        Stage::Output,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::History => "history",
            Self::ClinicalContext => "clinical_context",
            Self::Retrieve => "retrieve",
            Self::Emotion => "emotion",
            Self::Generate => "generate",
            Self::Save => "save",
            Self::Output => "output",
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// The counseling pipeline and its long-lived collaborators.
///
/// Safe to share across threads: concurrent runs share the store, the
/// retriever and the provider pool (and therefore its call counter).
pub struct CounselingPipeline {
    store: Arc<dyn ConversationStore>,
    retriever: Arc<dyn DocumentRetriever>,
    classifier: EmotionClassifier,
    pool: Arc<ProviderPool>,
    history_window: usize,
    questionnaire: String,
}

impl CounselingPipeline {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        retriever: Arc<dyn DocumentRetriever>,
        classifier: EmotionClassifier,
        pool: Arc<ProviderPool>,
    ) -> Self {
        Self {
            store,
            retriever,
            classifier,
            pool,
            history_window: config::DEFAULT_HISTORY_WINDOW,
            questionnaire: BUNDLED_QUESTIONNAIRE.to_string(),
        }
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_questionnaire(mut self, questionnaire: String) -> Self {
        self.questionnaire = questionnaire;
        self
    }

    /// Wire the production collaborators from configuration: SQLite store,
    /// Chroma retriever over OpenAI embeddings, OpenAI classifier, and an
    /// OpenAI/Gemini provider pool.
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let store = Arc::new(SqliteConversationStore::open(&config.database_path)?);

        let openai_key = config.openai_api_key.as_deref();
        let answer_openai = OpenAiProvider::new(
            openai_key,
            &config.openai_model,
            &config.openai_base_url,
            config::ANSWER_TEMPERATURE,
            config.http_timeout_secs,
        )?;
        let answer_gemini = GeminiProvider::new(
            config.gemini_api_key.as_deref(),
            &config.gemini_model,
            &config.gemini_base_url,
            config::ANSWER_TEMPERATURE,
            config.http_timeout_secs,
        )?;
        let classifier_provider = OpenAiProvider::new(
            openai_key,
            &config.openai_model,
            &config.openai_base_url,
            config::CLASSIFIER_TEMPERATURE,
            config.http_timeout_secs,
        )?;

        let embedder = Arc::new(OpenAiEmbedder::new(
            openai_key,
            &config.embedding_model,
            &config.openai_base_url,
            config.http_timeout_secs,
        )?);
        let retriever = ChromaRetriever::new(
            &config.chroma_url,
            &config.chroma_collection,
            embedder,
            config.retrieval_top_k,
            config.http_timeout_secs,
        )?;

        let pool = ProviderPool::new(vec![
            Arc::new(answer_openai) as Arc<dyn LlmProvider>,
            Arc::new(answer_gemini) as Arc<dyn LlmProvider>,
        ])?;

        tracing::info!(
            database = %config.database_path.display(),
            providers = ?pool.names(),
            collection = %config.chroma_collection,
            "Counseling pipeline configured"
        );

        Ok(Self::new(
            store,
            Arc::new(retriever),
            EmotionClassifier::new(Arc::new(classifier_provider)),
            Arc::new(pool),
        )
        .with_history_window(config.history_window)
        .with_questionnaire(assembly::load_questionnaire(config.phq9_path.as_deref())))
    }

    pub fn store(&self) -> &dyn ConversationStore {
        self.store.as_ref()
    }

    pub fn pool(&self) -> &ProviderPool {
        &self.pool
    }

    /// Service entry: validate the request, run the pipeline, return the answer.
    pub fn respond(&self, request: ChatRequest) -> Result<ChatResponse, PipelineError> {
        if request.user_input.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let owned = self
            .store
            .get_conversation(request.conversation_id)?
            .is_some_and(|c| c.user_id == request.user_id);
        if !owned {
            return Err(PipelineError::ConversationNotFound {
                conversation_id: request.conversation_id,
                user_id: request.user_id,
            });
        }

        let state = self.run(SessionState::from_request(&request))?;
        Ok(state.into_response())
    }

    /// Run every stage in order over `state`.
    pub fn run(&self, mut state: SessionState) -> Result<SessionState, PipelineError> {
        let started = Instant::now();
        tracing::info!(
            user_id = state.user_id,
            conversation_id = state.conversation_id,
            input_len = state.user_input.len(),
            "Pipeline run started"
        );

        for stage in Stage::ORDER {
            tracing::debug!(stage = stage.as_str(), conversation_id = state.conversation_id, "Stage");
            state = self.run_stage(stage, state)?;
        }

        tracing::info!(
            conversation_id = state.conversation_id,
            provider = state.provider_used().unwrap_or("none"),
            fallback_used = state.fallback_used(),
            score = state.score.map(|s| s.score),
            phq9_suggested = state.phq9_suggested,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline run completed"
        );
        Ok(state)
    }

    pub fn run_stage(&self, stage: Stage, state: SessionState) -> Result<SessionState, PipelineError> {
        match stage {
            Stage::History => self.load_history(state),
            Stage::ClinicalContext => self.load_clinical_context(state),
            Stage::Retrieve => Ok(self.retrieve(state)),
            Stage::Emotion => Ok(self.classify_emotion(state)),
            Stage::Generate => Ok(generator::generate_answer(state, &self.pool)),
            Stage::Save => self.save(state),
            Stage::Output => Ok(self.output(state)),
        }
    }

    pub fn load_history(&self, mut state: SessionState) -> Result<SessionState, PipelineError> {
        state.chat_history =
            history::load_history(self.store.as_ref(), state.conversation_id, self.history_window)?;
        Ok(state)
    }

    pub fn load_clinical_context(&self, mut state: SessionState) -> Result<SessionState, PipelineError> {
        state.clinical_context = history::load_clinical_context(self.store.as_ref(), state.user_id)?;
        Ok(state)
    }

    /// Soft stage: a retriever failure leaves the passage list empty.
    pub fn retrieve(&self, mut state: SessionState) -> SessionState {
        state.passages = match self.retriever.query(&state.user_input) {
            Ok(passages) => passages,
            Err(e) => {
                tracing::warn!(error = %e, conversation_id = state.conversation_id, "Retrieval failed, continuing without context");
                Vec::new()
            }
        };
        state
    }

    pub fn classify_emotion(&self, mut state: SessionState) -> SessionState {
        let emotion = self.classifier.classify(&state.user_input);
        state.depressed = emotion.is_depressed();
        state.emotion = Some(emotion);
        state
    }

    /// Append citations, persist the user turn and the reply, record any
    /// PHQ-9 score, then offer the questionnaire if due.
    ///
    /// The questionnaire is appended after the reply is stored, so it is
    /// returned to the user but not written to the log.
    pub fn save(&self, state: SessionState) -> Result<SessionState, PipelineError> {
        let mut state = assembly::append_citations(state);

        self.store
            .append_message(state.conversation_id, MessageRole::User, None, &state.user_input)?;
        self.store.append_message(
            state.conversation_id,
            MessageRole::Agent,
            Some(MENTAL_AGENT),
            &state.answer,
        )?;

        state.score = screening::extract_and_save(
            self.store.as_ref(),
            state.user_id,
            state.conversation_id,
            &state.user_input,
        )?;

        Ok(assembly::append_screening(state, &self.questionnaire))
    }

    pub fn output(&self, state: SessionState) -> SessionState {
        tracing::debug!(
            conversation_id = state.conversation_id,
            answer_len = state.answer.len(),
            "Answer ready"
        );
        state
    }
}
