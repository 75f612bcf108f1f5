//! Output assembly: citations block and one-shot screening questionnaire.

use std::path::Path;

use super::state::SessionState;

pub const NO_RELATED_DOCUMENTS: &str = "(관련 문서 없음)";

/// Questionnaire shipped with the crate.
pub const BUNDLED_QUESTIONNAIRE: &str = include_str!("../../resources/phq9.md");

/// Load the screening questionnaire, preferring `override_path` when it is
/// set and readable.
pub fn load_questionnaire(override_path: Option<&Path>) -> String {
    if let Some(path) = override_path {
        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => return text,
            Ok(_) => {
                tracing::warn!(path = %path.display(), "Questionnaire file is empty, using bundled copy");
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read questionnaire, using bundled copy");
            }
        }
    }
    BUNDLED_QUESTIONNAIRE.to_string()
}

/// Render the citations block for the given labels.
pub fn citations_block(labels: &[&str]) -> String {
    let mut block = String::from("\n\n[참고자료]\n");
    if labels.is_empty() {
        block.push_str("- ");
        block.push_str(NO_RELATED_DOCUMENTS);
    } else {
        let lines: Vec<String> = labels.iter().map(|label| format!("- {label}")).collect();
        block.push_str(&lines.join("\n"));
    }
    block
}

/// Append the citations block to the answer. Always runs.
pub fn append_citations(mut state: SessionState) -> SessionState {
    let block = citations_block(&state.citation_labels());
    state.answer.push_str(&block);
    state
}

/// Append the questionnaire when the user reads as depressed and it has not
/// been suggested yet, then flip the flag for the caller to carry.
pub fn append_screening(mut state: SessionState, questionnaire: &str) -> SessionState {
    if state.depressed && !state.phq9_suggested {
        state.answer.push_str("\n\n[PHQ-9 설문]\n");
        state.answer.push_str(questionnaire);
        state.phq9_suggested = true;
        tracing::info!(
            conversation_id = state.conversation_id,
            "PHQ-9 questionnaire suggested"
        );
    }
    state
}
