//! Emotion classification: one deterministic model call per message.
//!
//! Classification never fails the pipeline: any provider error degrades to
//! `Neutral` and is logged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::provider::LlmProvider;

const CLASSIFIER_SYSTEM_PROMPT: &str = "당신은 상담 대화의 감정을 분류하는 분석가입니다. \
지정된 값 중 하나만, 설명 없이 답하세요.";

/// Keyword that marks a raw label as depression, tolerant of label drift.
const DEPRESSION_KEYWORDS: &[&str] = &["우울", "depress"];

/// Coarse emotion vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionTag {
    Positive,
    Neutral,
    Sadness,
    Depression,
    Anxiety,
    Anger,
    Happiness,
    Other,
}

impl EmotionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Sadness => "sadness",
            Self::Depression => "depression",
            Self::Anxiety => "anxiety",
            Self::Anger => "anger",
            Self::Happiness => "happiness",
            Self::Other => "other",
        }
    }

    /// Korean label the model is asked to answer with.
    pub fn korean(&self) -> &'static str {
        match self {
            Self::Positive => "긍정",
            Self::Neutral => "중립",
            Self::Sadness => "슬픔",
            Self::Depression => "우울",
            Self::Anxiety => "불안",
            Self::Anger => "분노",
            Self::Happiness => "행복",
            Self::Other => "기타",
        }
    }

    pub const ALL: [EmotionTag; 8] = [
        Self::Positive,
        Self::Neutral,
        Self::Sadness,
        Self::Depression,
        Self::Anxiety,
        Self::Anger,
        Self::Happiness,
        Self::Other,
    ];

    /// Map free model output onto the vocabulary. Unknown text is `Other`.
    pub fn from_label(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        if lower.is_empty() {
            return Self::Other;
        }
        if is_depressed(&lower) {
            return Self::Depression;
        }
        Self::ALL
            .into_iter()
            .find(|tag| lower.contains(tag.korean()) || lower.contains(tag.as_str()))
            .unwrap_or(Self::Other)
    }
}

/// Classifier output: the normalized tag plus the raw model text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emotion {
    pub tag: EmotionTag,
    pub raw: String,
}

impl Emotion {
    pub fn neutral() -> Self {
        Self {
            tag: EmotionTag::Neutral,
            raw: EmotionTag::Neutral.korean().to_string(),
        }
    }

    pub fn is_depressed(&self) -> bool {
        is_depressed(&self.raw)
    }
}

/// True when the raw label mentions depression (substring match, not equality).
pub fn is_depressed(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    DEPRESSION_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Single-call emotion classifier. The provider should be configured with
/// zero temperature.
pub struct EmotionClassifier {
    provider: Arc<dyn LlmProvider>,
}

impl EmotionClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    pub fn classify(&self, text: &str) -> Emotion {
        let prompt = build_classifier_prompt(text);
        match self.provider.generate(CLASSIFIER_SYSTEM_PROMPT, &prompt) {
            Ok(raw) => {
                let raw = raw.trim().to_string();
                let tag = EmotionTag::from_label(&raw);
                tracing::debug!(tag = tag.as_str(), provider = self.provider.name(), "Emotion classified");
                Emotion { tag, raw }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Emotion classification failed, assuming neutral");
                Emotion::neutral()
            }
        }
    }
}

fn build_classifier_prompt(text: &str) -> String {
    let choices: Vec<&str> = EmotionTag::ALL.iter().map(|t| t.korean()).collect();
    format!(
        "다음 사용자의 감정을 하나의 단어로 요약해 주세요.\n가능한 값: {}.\n텍스트: \"{}\"\n감정:",
        choices.join(", "),
        text
    )
}
