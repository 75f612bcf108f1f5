use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "counsel-agent";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of most recent messages rendered into the prompt.
pub const DEFAULT_HISTORY_WINDOW: usize = 6;

/// Passages requested from the document retriever per query.
pub const DEFAULT_RETRIEVAL_TOP_K: usize = 4;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_CHROMA_URL: &str = "http://localhost:8000";
pub const DEFAULT_CHROMA_COLLECTION: &str = "global-documents";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Sampling temperature for counseling answers.
pub const ANSWER_TEMPERATURE: f32 = 0.7;
/// Emotion labelling must be deterministic.
pub const CLASSIFIER_TEMPERATURE: f32 = 0.0;

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "counsel_agent=info,warn"
}

/// Get the application data directory.
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default SQLite database location.
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("counsel.db")
}

/// Runtime configuration read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_model: String,
    pub gemini_model: String,
    pub openai_base_url: String,
    pub gemini_base_url: String,
    pub embedding_model: String,
    pub database_path: PathBuf,
    pub history_window: usize,
    pub phq9_path: Option<PathBuf>,
    pub chroma_url: String,
    pub chroma_collection: String,
    pub retrieval_top_k: usize,
    pub http_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            gemini_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.into(),
            gemini_model: DEFAULT_GEMINI_MODEL.into(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.into(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.into(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.into(),
            database_path: default_database_path(),
            history_window: DEFAULT_HISTORY_WINDOW,
            phq9_path: None,
            chroma_url: DEFAULT_CHROMA_URL.into(),
            chroma_collection: DEFAULT_CHROMA_COLLECTION.into(),
            retrieval_top_k: DEFAULT_RETRIEVAL_TOP_K,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl AppConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset. Unparseable numbers fall back to
    /// their defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            openai_api_key: get("OPENAI_API_KEY"),
            gemini_api_key: get("GEMINI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            gemini_base_url: get("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            embedding_model: get("OPENAI_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            database_path: get("COUNSEL_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            history_window: parse_or(
                get("COUNSEL_HISTORY_WINDOW"),
                "COUNSEL_HISTORY_WINDOW",
                defaults.history_window,
            ),
            phq9_path: get("COUNSEL_PHQ9_PATH").map(PathBuf::from),
            chroma_url: get("CHROMA_URL").unwrap_or(defaults.chroma_url),
            chroma_collection: get("CHROMA_COLLECTION").unwrap_or(defaults.chroma_collection),
            retrieval_top_k: parse_or(
                get("COUNSEL_RETRIEVAL_TOP_K"),
                "COUNSEL_RETRIEVAL_TOP_K",
                defaults.retrieval_top_k,
            ),
            http_timeout_secs: parse_or(
                get("COUNSEL_HTTP_TIMEOUT_SECS"),
                "COUNSEL_HTTP_TIMEOUT_SECS",
                defaults.http_timeout_secs,
            ),
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> T {
    match value {
        Some(raw) => match raw.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Invalid numeric setting, using default");
                default
            }
        },
        None => default,
    }
}
