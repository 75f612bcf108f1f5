pub mod openai;
pub mod gemini;
pub mod pool;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use pool::{CallCounter, ProviderPool};

use thiserror::Error;

/// Failure of a single provider call (transport, quota, or model error).
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider} is unreachable: {message}")]
    Connection { provider: String, message: String },

    #[error("{provider} request timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    #[error("{provider} returned error (status {status}): {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} returned no text")]
    EmptyResponse { provider: String },

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// An interchangeable text-generation backend.
pub trait LlmProvider: Send + Sync {
    /// Stable name used for selection, fallback and logging.
    fn name(&self) -> &str;

    fn generate(&self, system: &str, prompt: &str) -> Result<String, ProviderError>;
}

/// Map a `reqwest` send failure onto the provider error taxonomy.
pub(crate) fn send_error(provider: &str, timeout_secs: u64, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            provider: provider.to_string(),
            secs: timeout_secs,
        }
    } else {
        ProviderError::Connection {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client, ProviderError> {
    reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::{LlmProvider, ProviderError};

    pub fn shared(provider: ScriptedProvider) -> Arc<dyn LlmProvider> {
        Arc::new(provider)
    }

    /// Test provider that always answers or always fails, and records prompts.
    pub struct ScriptedProvider {
        name: String,
        reply: Result<String, String>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        pub fn answering(name: &str, reply: &str) -> Self {
            Self::build(name, Ok(reply.to_string()))
        }

        pub fn failing(name: &str, message: &str) -> Self {
            Self::build(name, Err(message.to_string()))
        }

        fn build(name: &str, reply: Result<String, String>) -> Self {
            Self {
                name: name.to_string(),
                reply,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn last_prompt(&self) -> Option<String> {
            self.prompts.lock().unwrap().last().cloned()
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn generate(&self, _system: &str, prompt: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(message) => Err(ProviderError::Http {
                    provider: self.name.clone(),
                    status: 503,
                    body: message.clone(),
                }),
            }
        }
    }
}
