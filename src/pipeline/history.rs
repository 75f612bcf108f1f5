//! History window and clinical context loading.

use crate::db::DatabaseError;
use crate::store::ConversationStore;

use super::state::ClinicalContext;

/// Last `window` messages of the conversation as `"<Role>: <text>"` lines,
/// oldest first.
pub fn load_history(
    store: &dyn ConversationStore,
    conversation_id: i64,
    window: usize,
) -> Result<Vec<String>, DatabaseError> {
    let messages = store.get_messages(conversation_id)?;
    let skip = messages.len().saturating_sub(window);

    Ok(messages
        .iter()
        .skip(skip)
        .map(|m| format!("{}: {}", m.role.prompt_prefix(), m.content))
        .collect())
}

/// Latest stored assessment for the user. Absence is not an error.
pub fn load_clinical_context(
    store: &dyn ConversationStore,
    user_id: i64,
) -> Result<ClinicalContext, DatabaseError> {
    Ok(ClinicalContext::from_assessment(store.get_assessment(user_id)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{MessageRole, SeverityBand};
    use crate::pipeline::state::NO_PRIOR_SESSION;
    use crate::store::SqliteConversationStore;

    fn seeded(count: usize) -> (SqliteConversationStore, i64) {
        let store = SqliteConversationStore::open_in_memory().unwrap();
        let conv = store.start_conversation(1, None).unwrap();
        for i in 0..count {
            let role = if i % 2 == 0 { MessageRole::User } else { MessageRole::Agent };
            store
                .append_message(conv.id, role, None, &format!("message {i}"))
                .unwrap();
        }
        (store, conv.id)
    }

    #[test]
    fn window_keeps_last_six_in_order() {
        let (store, conv_id) = seeded(10);
        let history = load_history(&store, conv_id, 6).unwrap();

        assert_eq!(
            history,
            vec![
                "Human: message 4",
                "AI: message 5",
                "Human: message 6",
                "AI: message 7",
                "Human: message 8",
                "AI: message 9",
            ]
        );
    }

    #[test]
    fn short_conversation_returns_everything() {
        let (store, conv_id) = seeded(3);
        let history = load_history(&store, conv_id, 6).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0], "Human: message 0");
    }

    #[test]
    fn empty_conversation_and_zero_window() {
        let (store, conv_id) = seeded(0);
        assert!(load_history(&store, conv_id, 6).unwrap().is_empty());

        let (store, conv_id) = seeded(4);
        assert!(load_history(&store, conv_id, 0).unwrap().is_empty());
    }

    #[test]
    fn clinical_context_reads_latest_assessment() {
        let store = SqliteConversationStore::open_in_memory().unwrap();
        assert_eq!(load_clinical_context(&store, 9).unwrap().render(), NO_PRIOR_SESSION);

        store.upsert_assessment(9, 21, SeverityBand::VerySevere).unwrap();
        let rendered = load_clinical_context(&store, 9).unwrap().render();
        assert!(rendered.starts_with("PHQ-9 점수: 21점 (매우 심한 우울, "));
    }
}
