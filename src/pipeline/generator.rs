//! Response Generator: augmented prompt construction and provider failover.
//!
//! One attempt on the selected provider plus exactly one attempt on its
//! fallback. No backoff and no further retries. A double failure is not an
//! error: the answer becomes a fixed user-visible message carrying both
//! error details, and the outcome is `Degraded`.

use serde::{Deserialize, Serialize};

use super::provider::ProviderPool;
use super::state::SessionState;

const COUNSELOR_SYSTEM_PROMPT: &str = "당신은 친절하고 공감하는 정신 건강 상담사입니다. \
사용자의 이야기를 판단하지 않고 경청하며, 이해하기 쉬운 말로 답합니다. \
상담 기록이나 참고 내용에 실명이 있더라도 언급하지 마세요.";

const DOUBLE_FAILURE_PREFIX: &str = "두 모델 모두 오류가 발생했습니다";

/// A provider call that failed, kept for the error detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAttempt {
    pub provider: String,
    pub error: String,
}

/// Result of the generation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationOutcome {
    /// A provider produced the text. `fallback_from` is set when the first
    /// choice failed and its fallback answered.
    Answered {
        text: String,
        provider: String,
        fallback_from: Option<FailedAttempt>,
    },
    /// Both attempts failed; `text` is the user-visible failure message.
    Degraded {
        text: String,
        primary: FailedAttempt,
        fallback: FailedAttempt,
    },
}

impl GenerationOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Answered { text, .. } | Self::Degraded { text, .. } => text,
        }
    }

    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Answered { provider, .. } => Some(provider),
            Self::Degraded { .. } => None,
        }
    }

    pub fn fallback_used(&self) -> bool {
        match self {
            Self::Answered { fallback_from, .. } => fallback_from.is_some(),
            Self::Degraded { .. } => true,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// Error text of every failed attempt, joined with " / ".
    pub fn error_detail(&self) -> Option<String> {
        match self {
            Self::Answered { fallback_from, .. } => fallback_from.as_ref().map(|f| f.error.clone()),
            Self::Degraded { primary, fallback, .. } => {
                Some(format!("{} / {}", primary.error, fallback.error))
            }
        }
    }
}

/// Build the combined prompt from the session state.
pub fn build_prompt(state: &SessionState) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str(
        "인사말을 반복하지 말고 질문에 바로 상담 답변을 해 주세요.\n\
         아래 세션 정보, 최근 대화, 참고 내용을 종합하여 답변하세요.\n\
         이전 대화에서 언급된 PHQ-9 점수, 감정 상태, 개인적 상황을 기억하고 이전 세션과 이어지는 상담을 제공하세요.\n\
         사용자가 우울함을 드러내면 공감하고 PHQ-9 설문을 권하세요. PHQ-9 점수가 있다면 점수에 맞는 조치를 안내하세요.\n\n",
    );

    prompt.push_str("=== 사용자 세션 정보 ===\n");
    prompt.push_str(&state.clinical_context.render());
    prompt.push_str("\n\n=== 최근 대화 내용 ===\n");
    prompt.push_str(&state.chat_history.join("\n"));
    prompt.push_str("\n\n=== 상담 기록 및 참고 내용 ===\n");
    prompt.push_str(&state.grounding_context());
    prompt.push_str("\n\n=== 현재 질문 ===\n");
    prompt.push_str(&state.user_input);
    prompt.push_str("\n\n답변:\n");

    prompt
}

/// Generation stage: select a provider, fall back once, never fail.
pub fn generate_answer(mut state: SessionState, pool: &ProviderPool) -> SessionState {
    let prompt = build_prompt(&state);
    let chosen = pool.select();

    let outcome = match chosen.generate(COUNSELOR_SYSTEM_PROMPT, &prompt) {
        Ok(text) => GenerationOutcome::Answered {
            text,
            provider: chosen.name().to_string(),
            fallback_from: None,
        },
        Err(first_err) => {
            let first = FailedAttempt {
                provider: chosen.name().to_string(),
                error: first_err.to_string(),
            };
            tracing::warn!(
                provider = chosen.name(),
                error = %first_err,
                conversation_id = state.conversation_id,
                "Provider failed, trying fallback"
            );

            match pool.fallback_for(chosen.name()) {
                Some(fallback) => match fallback.generate(COUNSELOR_SYSTEM_PROMPT, &prompt) {
                    Ok(text) => GenerationOutcome::Answered {
                        text,
                        provider: fallback.name().to_string(),
                        fallback_from: Some(first),
                    },
                    Err(second_err) => {
                        tracing::error!(
                            primary = %first.provider,
                            fallback = fallback.name(),
                            error = %second_err,
                            conversation_id = state.conversation_id,
                            "Both providers failed"
                        );
                        degraded(
                            first,
                            FailedAttempt {
                                provider: fallback.name().to_string(),
                                error: second_err.to_string(),
                            },
                        )
                    }
                },
                None => {
                    let missing = FailedAttempt {
                        provider: String::new(),
                        error: format!("no fallback for {}", first.provider),
                    };
                    degraded(first, missing)
                }
            }
        }
    };

    if let Some(provider) = outcome.provider() {
        tracing::debug!(
            provider,
            fallback_used = outcome.fallback_used(),
            answer_len = outcome.text().len(),
            "Answer generated"
        );
    }

    state.answer = outcome.text().to_string();
    state.generation = Some(outcome);
    state
}

fn degraded(primary: FailedAttempt, fallback: FailedAttempt) -> GenerationOutcome {
    GenerationOutcome::Degraded {
        text: format!(
            "{DOUBLE_FAILURE_PREFIX}: {} / {}",
            primary.error, fallback.error
        ),
        primary,
        fallback,
    }
}
