pub mod state;
pub mod history;
pub mod retrieval;
pub mod emotion;
pub mod provider;
pub mod generator;
pub mod screening;
pub mod assembly;
pub mod orchestrator;

pub use orchestrator::{CounselingPipeline, Stage};
pub use state::{ChatRequest, ChatResponse, SessionState};

use thiserror::Error;

use crate::db::DatabaseError;
use provider::ProviderError;
use retrieval::RetrievalError;

/// Request-level failures. Soft failures (retrieval, emotion, generation)
/// never surface here.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Conversation {conversation_id} not found for user {user_id}")]
    ConversationNotFound { conversation_id: i64, user_id: i64 },

    #[error("Message text is empty")]
    EmptyInput,

    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Retriever setup failed: {0}")]
    Retrieval(#[from] RetrievalError),
}
