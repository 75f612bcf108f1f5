//! Document retrieval: similarity search over the counseling corpus.
//!
//! The pipeline only depends on `DocumentRetriever::query`. The production
//! implementation is `ChromaRetriever`: an HTTP vector database queried with
//! OpenAI embeddings.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Placeholder shown when a passage carries no usable source label.
pub const UNKNOWN_SOURCE: &str = "(출처 미상)";

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Vector search failed: {0}")]
    VectorSearch(String),

    #[error("HTTP error (status {status}): {body}")]
    Http { status: u16, body: String },

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Retriever not configured: {0}")]
    NotConfigured(String),
}

/// Source metadata attached to an indexed passage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassageMetadata {
    pub source: Option<String>,
    pub title: Option<String>,
}

impl PassageMetadata {
    pub fn with_source(source: &str) -> Self {
        Self {
            source: Some(source.to_string()),
            title: None,
        }
    }

    pub fn with_title(title: &str) -> Self {
        Self {
            source: None,
            title: Some(title.to_string()),
        }
    }

    /// Pick the preferred string fields out of a free-form metadata object.
    pub fn from_json(map: &Map<String, Value>) -> Self {
        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            source: text("source"),
            title: text("title"),
        }
    }
}

/// A retrieved passage and its metadata, in rank order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub metadata: PassageMetadata,
}

impl Passage {
    pub fn new(text: &str, metadata: PassageMetadata) -> Self {
        Self {
            text: text.to_string(),
            metadata,
        }
    }

    /// First available of the explicit source field, then the title.
    pub fn citation(&self) -> Option<&str> {
        self.metadata
            .source
            .as_deref()
            .or(self.metadata.title.as_deref())
    }

    /// Citation as rendered in the answer.
    pub fn citation_label(&self) -> &str {
        self.citation().unwrap_or(UNKNOWN_SOURCE)
    }
}

/// Similarity search over an indexed corpus.
pub trait DocumentRetriever: Send + Sync {
    fn query(&self, text: &str) -> Result<Vec<Passage>, RetrievalError>;
}

/// Text → vector embedding model.
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

// ═══════════════════════════════════════════════════════════
// OpenAI embeddings
// ═══════════════════════════════════════════════════════════

/// Embedding model backed by the OpenAI `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: Option<&str>,
        model: &str,
        base_url: &str,
        timeout_secs: u64,
    ) -> Result<Self, RetrievalError> {
        let api_key = api_key
            .ok_or_else(|| RetrievalError::NotConfigured("OPENAI_API_KEY is not set".into()))?;
        Ok(Self {
            client: blocking_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

impl EmbeddingModel for OpenAiEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let parsed: EmbeddingResponse = read_json(response)?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RetrievalError::Embedding("empty embedding response".into()))
    }
}

// ═══════════════════════════════════════════════════════════
// Chroma retriever
// ═══════════════════════════════════════════════════════════

/// Retriever backed by a Chroma server collection.
pub struct ChromaRetriever {
    client: reqwest::blocking::Client,
    base_url: String,
    collection: String,
    embedder: Arc<dyn EmbeddingModel>,
    top_k: usize,
    /// Server-side id of `collection`, resolved on the first query.
    resolved_id: OnceLock<String>,
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Serialize)]
struct ChromaQueryRequest<'a> {
    query_embeddings: Vec<Vec<f32>>,
    n_results: usize,
    include: [&'a str; 2],
}

#[derive(Deserialize)]
struct ChromaQueryResponse {
    documents: Option<Vec<Vec<Option<String>>>>,
    metadatas: Option<Vec<Vec<Option<Map<String, Value>>>>>,
}

impl ChromaRetriever {
    pub fn new(
        base_url: &str,
        collection: &str,
        embedder: Arc<dyn EmbeddingModel>,
        top_k: usize,
        timeout_secs: u64,
    ) -> Result<Self, RetrievalError> {
        Ok(Self {
            client: blocking_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            embedder,
            top_k,
            resolved_id: OnceLock::new(),
        })
    }

    fn collection_id(&self) -> Result<&str, RetrievalError> {
        cached_or_fetch(&self.resolved_id, || self.fetch_collection_id())
    }

    fn fetch_collection_id(&self) -> Result<String, RetrievalError> {
        let response = self
            .client
            .get(format!("{}/api/v1/collections/{}", self.base_url, self.collection))
            .send()
            .map_err(|e| RetrievalError::VectorSearch(e.to_string()))?;
        let parsed: CollectionResponse = read_json(response)?;
        tracing::debug!(collection = %self.collection, id = %parsed.id, "Resolved Chroma collection");
        Ok(parsed.id)
    }
}

/// Value held in `cell`, or the result of `fetch` stored there. Errors are not cached.
fn cached_or_fetch<E>(
    cell: &OnceLock<String>,
    fetch: impl FnOnce() -> Result<String, E>,
) -> Result<&str, E> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = fetch()?;
    Ok(cell.get_or_init(|| value))
}

impl DocumentRetriever for ChromaRetriever {
    fn query(&self, text: &str) -> Result<Vec<Passage>, RetrievalError> {
        let embedding = self.embedder.embed(text)?;
        let collection_id = self.collection_id()?;

        let response = self
            .client
            .post(format!(
                "{}/api/v1/collections/{}/query",
                self.base_url, collection_id
            ))
            .json(&ChromaQueryRequest {
                query_embeddings: vec![embedding],
                n_results: self.top_k,
                include: ["documents", "metadatas"],
            })
            .send()
            .map_err(|e| RetrievalError::VectorSearch(e.to_string()))?;

        let parsed: ChromaQueryResponse = read_json(response)?;
        Ok(passages_from_chroma(parsed))
    }
}

/// Flatten the first query's result lists into passages, skipping empty documents.
fn passages_from_chroma(response: ChromaQueryResponse) -> Vec<Passage> {
    let documents = response
        .documents
        .and_then(|mut d| (!d.is_empty()).then(|| d.swap_remove(0)))
        .unwrap_or_default();
    let mut metadatas = response
        .metadatas
        .and_then(|mut m| (!m.is_empty()).then(|| m.swap_remove(0)))
        .unwrap_or_default()
        .into_iter();

    documents
        .into_iter()
        .filter_map(|document| {
            let metadata = metadatas
                .next()
                .flatten()
                .map(|map| PassageMetadata::from_json(&map))
                .unwrap_or_default();
            document
                .filter(|text| !text.trim().is_empty())
                .map(|text| Passage { text, metadata })
        })
        .collect()
}

fn blocking_client(timeout_secs: u64) -> Result<reqwest::blocking::Client, RetrievalError> {
    reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RetrievalError::NotConfigured(format!("HTTP client: {e}")))
}

fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::blocking::Response,
) -> Result<T, RetrievalError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(RetrievalError::Http {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .map_err(|e| RetrievalError::ResponseParsing(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::testing::{cosine_similarity, InMemoryRetriever, KeywordEmbedder};
    use super::*;
    use std::cell::Cell;

    fn retriever() -> InMemoryRetriever {
        let embedder = Arc::new(KeywordEmbedder {
            vocabulary: vec!["불면", "우울", "불안", "직장"],
        });
        let mut retriever = InMemoryRetriever::new(embedder, 2);
        retriever
            .add("불면이 계속될 때는 수면 위생을 점검합니다.", PassageMetadata::with_source("sleep.pdf"))
            .unwrap();
        retriever
            .add("우울감이 2주 이상 지속되면 상담을 권합니다.", PassageMetadata::with_title("우울 가이드"))
            .unwrap();
        retriever
            .add("직장 스트레스와 불안 관리법", PassageMetadata::default())
            .unwrap();
        retriever
    }

    #[test]
    fn cosine_similarity_identical_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!((sim - 1.0).abs() < 0.01);
    }

    #[test]
    fn cosine_similarity_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn query_returns_top_k_in_rank_order() {
        let results = retriever().query("요즘 우울하고 불면이 심해요").unwrap();
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|p| p.text.contains("불면") || p.text.contains("우울")));
        assert!(!results.iter().any(|p| p.text.contains("직장")));
    }

    #[test]
    fn empty_index_returns_no_passages() {
        let embedder = Arc::new(KeywordEmbedder { vocabulary: vec!["a"] });
        let retriever = InMemoryRetriever::new(embedder, 4);
        assert!(retriever.query("anything").unwrap().is_empty());
    }

    #[test]
    fn citation_prefers_source_then_title() {
        let both = Passage::new(
            "t",
            PassageMetadata {
                source: Some("a.pdf".into()),
                title: Some("A".into()),
            },
        );
        assert_eq!(both.citation(), Some("a.pdf"));

        let title_only = Passage::new("t", PassageMetadata::with_title("A"));
        assert_eq!(title_only.citation_label(), "A");

        let neither = Passage::new("t", PassageMetadata::default());
        assert_eq!(neither.citation(), None);
        assert_eq!(neither.citation_label(), UNKNOWN_SOURCE);
    }

    #[test]
    fn metadata_from_json_ignores_non_string_and_blank_fields() {
        let value: Value = serde_json::json!({"source": "  ", "title": "상담 사례 12", "page": 3});
        let metadata = PassageMetadata::from_json(value.as_object().unwrap());
        assert_eq!(metadata.source, None);
        assert_eq!(metadata.title.as_deref(), Some("상담 사례 12"));
    }

    #[test]
    fn chroma_response_flattens_first_query() {
        let response: ChromaQueryResponse = serde_json::from_value(serde_json::json!({
            "ids": [["1", "2", "3"]],
            "documents": [["첫 번째", null, "세 번째"]],
            "metadatas": [[{"source": "one.txt"}, null, {"title": "Three"}]]
        }))
        .unwrap();

        let passages = passages_from_chroma(response);
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].citation(), Some("one.txt"));
        assert_eq!(passages[1].text, "세 번째");
        assert_eq!(passages[1].citation(), Some("Three"));
    }

    #[test]
    fn chroma_response_without_results_is_empty() {
        let response: ChromaQueryResponse =
            serde_json::from_value(serde_json::json!({"documents": [], "metadatas": null}))
                .unwrap();
        assert!(passages_from_chroma(response).is_empty());
    }

    #[test]
    fn collection_id_is_fetched_once() {
        let cell = OnceLock::new();
        let fetches = Cell::new(0);
        let fetch = || {
            fetches.set(fetches.get() + 1);
            Ok::<_, RetrievalError>("c-123".to_string())
        };

        assert_eq!(cached_or_fetch(&cell, fetch).unwrap(), "c-123");
        assert_eq!(cached_or_fetch(&cell, fetch).unwrap(), "c-123");
        assert_eq!(fetches.get(), 1);
    }

    #[test]
    fn failed_collection_lookup_is_retried() {
        let cell = OnceLock::new();
        let failed = cached_or_fetch(&cell, || {
            Err(RetrievalError::Http {
                status: 404,
                body: "collection not found".into(),
            })
        });
        assert!(matches!(failed, Err(RetrievalError::Http { status: 404, .. })));
        assert!(cell.get().is_none());

        let id = cached_or_fetch(&cell, || Ok::<_, RetrievalError>("c-456".to_string())).unwrap();
        assert_eq!(id, "c-456");
    }

    #[test]
    fn chroma_retriever_starts_unresolved() {
        let embedder = Arc::new(KeywordEmbedder { vocabulary: vec!["a"] });
        let retriever =
            ChromaRetriever::new("http://localhost:8000/", "counseling", embedder, 4, 5).unwrap();
        assert!(retriever.resolved_id.get().is_none());
        assert_eq!(retriever.base_url, "http://localhost:8000");
    }

    #[test]
    fn openai_embedder_requires_key() {
        let result = OpenAiEmbedder::new(None, "text-embedding-3-small", "https://x", 10);
        assert!(matches!(result, Err(RetrievalError::NotConfigured(_))));
    }
}
