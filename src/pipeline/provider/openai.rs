//! OpenAI Chat Completions provider (blocking).

use serde::{Deserialize, Serialize};

use super::{http_client, send_error, LlmProvider, ProviderError};

pub const OPENAI: &str = "openai";

/// Provider backed by the OpenAI `/chat/completions` endpoint.
pub struct OpenAiProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout_secs: u64,
}

impl OpenAiProvider {
    pub fn new(
        api_key: Option<&str>,
        model: &str,
        base_url: &str,
        temperature: f32,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key
            .ok_or_else(|| ProviderError::NotConfigured("OPENAI_API_KEY is not set".into()))?;

        Ok(Self {
            client: http_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
            timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        OPENAI
    }

    fn generate(&self, system: &str, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| send_error(OPENAI, self.timeout_secs, e))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().unwrap_or_default();
            return Err(ProviderError::Http {
                provider: OPENAI.to_string(),
                status: status.as_u16(),
                body: api_error_message(&raw),
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .map_err(|e| ProviderError::ResponseParsing(e.to_string()))?;

        extract_text(parsed)
    }
}

fn extract_text(response: ChatCompletionResponse) -> Result<String, ProviderError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ProviderError::EmptyResponse {
            provider: OPENAI.to_string(),
        })
}

fn api_error_message(raw: &str) -> String {
    serde_json::from_str::<ErrorResponse>(raw)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_not_configured() {
        let result = OpenAiProvider::new(None, "gpt-4o-mini", "https://api.openai.com/v1", 0.7, 30);
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let provider =
            OpenAiProvider::new(Some("sk-test"), "gpt-4o-mini", "http://localhost:9/v1/", 0.7, 30)
                .unwrap();
        assert_eq!(provider.base_url, "http://localhost:9/v1");
        assert_eq!(provider.name(), OPENAI);
    }

    #[test]
    fn extracts_first_choice_content() {
        let parsed: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  힘드셨겠어요.  "}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(parsed).unwrap(), "힘드셨겠어요.");
    }

    #[test]
    fn empty_choices_is_empty_response() {
        let parsed: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            extract_text(parsed),
            Err(ProviderError::EmptyResponse { .. })
        ));
    }

    #[test]
    fn api_error_body_is_unwrapped() {
        let raw = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
        assert_eq!(api_error_message(raw), "Rate limit reached");
        assert_eq!(api_error_message("plain failure"), "plain failure");
    }
}
