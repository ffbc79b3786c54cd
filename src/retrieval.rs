//! Retrieval of reference passages for a query.
//!
//! A [`ContextRetriever`] embeds the query with an [`Embedder`], asks a [`VectorIndex`] for the
//! nearest stored passages and joins their text into a context blob.  Both collaborators are
//! hosted services: [`HuggingFaceEmbedder`] and [`PineconeIndex`] are the production
//! implementations.  Retrieval is supplementary, so [`ContextRetriever::retrieve`] never fails;
//! any error degrades to [`NO_CONTEXT`].

use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client as ReqwestClient;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::http;
use crate::observability::{RETRIEVAL_EMPTY, RETRIEVAL_ERRORS, RETRIEVAL_REQUESTS};

/// Returned when retrieval finds nothing or fails.
pub const NO_CONTEXT: &str = "No relevant context found.";

/// Number of passages requested when the caller does not say.
pub const DEFAULT_TOP_K: u32 = 3;

/// Environment variable holding the vector index key.
pub const PINECONE_API_KEY: &str = "PINECONE_API_KEY";

/// Optional environment variable holding the embedding service token.
pub const HF_API_KEY: &str = "HF_API_KEY";

/// Index queried when none is configured.
pub const DEFAULT_INDEX_NAME: &str = "new-medical-bot";

/// Embedding model used for queries.
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-small-en";

const HF_INFERENCE_URL: &str = "https://api-inference.huggingface.co/pipeline/feature-extraction/";
const PINECONE_CONTROL_URL: &str = "https://api.pinecone.io/";
const PINECONE_API_VERSION: &str = "2024-07";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Computes embeddings for text.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Returns a unit-length embedding of `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// A nearest-neighbor index over stored passages.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns up to `top_k` matches for `vector`, best first, with metadata.
    async fn query(&self, vector: &[f32], top_k: u32) -> Result<Vec<IndexMatch>>;
}

/// One ranked match returned by a [`VectorIndex`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexMatch {
    /// Identifier of the stored vector.
    #[serde(default)]
    pub id: String,

    /// Similarity score; higher is closer.
    #[serde(default)]
    pub score: f32,

    /// Metadata stored with the vector.
    #[serde(default)]
    pub metadata: Option<MatchMetadata>,
}

/// Metadata attached to an indexed passage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MatchMetadata {
    /// The passage text.
    #[serde(default)]
    pub text: Option<String>,
}

impl IndexMatch {
    /// Creates a match carrying `text` in its metadata.
    pub fn with_text(id: impl Into<String>, score: f32, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            score,
            metadata: Some(MatchMetadata {
                text: Some(text.into()),
            }),
        }
    }

    /// The passage text, if the match carries one.
    pub fn text(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.text.as_deref())
    }
}

/// Scales `vector` to unit length.
pub fn normalize(mut vector: Vec<f32>) -> Result<Vec<f32>> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if vector.is_empty() || !norm.is_finite() || norm == 0.0 {
        return Err(Error::validation(
            "embedding has no direction and cannot be normalized",
            Some("embedding".to_string()),
        ));
    }
    for x in vector.iter_mut() {
        *x /= norm;
    }
    Ok(vector)
}

/// Formats the prompt sent in place of the user's raw query when retrieval is on.
pub fn augment_prompt(context: &str, query: &str) -> String {
    format!("Retrieved Context:\n{context}\n\nUser Query: {query}")
}

///////////////////////////////////////// Retriever /////////////////////////////////////////

/// Joins the passages nearest a query into one context blob.
#[derive(Clone)]
pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl ContextRetriever {
    /// Creates a retriever from its two collaborators.
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Embeds `query`, fetches `top_k` matches and joins their text with newlines.
    ///
    /// Matches without text are skipped.  When nothing remains the sentinel [`NO_CONTEXT`] is
    /// returned.
    ///
    /// # Errors
    ///
    /// Any embedding or index failure, wrapped as [`Error::Retrieval`].
    pub async fn try_retrieve(&self, query: &str, top_k: u32) -> Result<String> {
        RETRIEVAL_REQUESTS.click();
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| wrap_retrieval("embedding failed", e))?;
        let matches = self
            .index
            .query(&vector, top_k)
            .await
            .map_err(|e| wrap_retrieval("vector index query failed", e))?;
        let context = matches
            .iter()
            .filter_map(IndexMatch::text)
            .collect::<Vec<_>>()
            .join("\n");
        if context.is_empty() {
            RETRIEVAL_EMPTY.click();
            Ok(NO_CONTEXT.to_string())
        } else {
            tracing::debug!(matches = matches.len(), "retrieved context");
            Ok(context)
        }
    }

    /// Like [`try_retrieve`](Self::try_retrieve), but failures yield [`NO_CONTEXT`].
    pub async fn retrieve(&self, query: &str, top_k: u32) -> String {
        match self.try_retrieve(query, top_k).await {
            Ok(context) => context,
            Err(err) => {
                RETRIEVAL_ERRORS.click();
                let cause = std::error::Error::source(&err)
                    .map(ToString::to_string)
                    .unwrap_or_default();
                tracing::warn!(
                    error = %err,
                    cause = %cause,
                    "retrieval failed; continuing without context"
                );
                NO_CONTEXT.to_string()
            }
        }
    }
}

fn wrap_retrieval(message: impl Into<String>, err: Error) -> Error {
    if err.is_retrieval() {
        err
    } else {
        Error::retrieval(message, Some(err))
    }
}

///////////////////////////////////////// Hugging Face ////////////////////////////////////////

/// Embeddings from the hosted Hugging Face feature-extraction pipeline.
#[derive(Clone)]
pub struct HuggingFaceEmbedder {
    api_key: Option<String>,
    client: ReqwestClient,
    endpoint: Url,
    timeout: Duration,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureExtraction {
    Pooled(Vec<f32>),
    Tokens(Vec<Vec<f32>>),
    Batch(Vec<Vec<Vec<f32>>>),
}

impl FeatureExtraction {
    /// Reduces the response to one sentence vector.  Token-level output uses the first (CLS)
    /// token, which is how BGE models pool.
    fn into_vector(self) -> Option<Vec<f32>> {
        match self {
            FeatureExtraction::Pooled(vector) => Some(vector),
            FeatureExtraction::Tokens(tokens) => tokens.into_iter().next(),
            FeatureExtraction::Batch(batch) => batch.into_iter().next()?.into_iter().next(),
        }
    }
}

impl fmt::Debug for HuggingFaceEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HuggingFaceEmbedder")
            .field("endpoint", &self.endpoint.as_str())
            .field("authenticated", &self.api_key.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HuggingFaceEmbedder {
    /// Creates an embedder for [`DEFAULT_EMBEDDING_MODEL`].
    ///
    /// The token is optional; when `None` it is read from `HF_API_KEY` if set.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let endpoint = format!("{HF_INFERENCE_URL}{DEFAULT_EMBEDDING_MODEL}");
        Self::with_options(api_key, Some(endpoint), None)
    }

    /// Creates an embedder posting to a custom endpoint.
    pub fn with_options(
        api_key: Option<String>,
        endpoint: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = api_key.or_else(|| env::var(HF_API_KEY).ok().filter(|k| !k.trim().is_empty()));
        let endpoint = endpoint
            .unwrap_or_else(|| format!("{HF_INFERENCE_URL}{DEFAULT_EMBEDDING_MODEL}"));
        let endpoint = Url::parse(&endpoint)?;
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        Ok(Self {
            api_key,
            client: http::build_client(timeout)?,
            endpoint,
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl Embedder for HuggingFaceEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct Request<'a> {
            inputs: &'a str,
        }

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&Request { inputs: text });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| http::request_error(e, self.timeout))?;
        if !response.status().is_success() {
            return Err(http::error_from_response(response).await);
        }
        let body: FeatureExtraction = response.json().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse embedding response: {e}"),
                Some(Box::new(e)),
            )
        })?;
        let vector = body.into_vector().ok_or_else(|| {
            Error::serialization("embedding response contained no vector", None)
        })?;
        normalize(vector)
    }
}

///////////////////////////////////////// Pinecone ///////////////////////////////////////////

/// A Pinecone serverless index reached over its data-plane REST API.
#[derive(Clone)]
pub struct PineconeIndex {
    api_key: String,
    client: ReqwestClient,
    host: Url,
    timeout: Duration,
}

impl PineconeIndex {
    /// Connects to the index at `host` (with or without scheme).
    ///
    /// The key is read from `PINECONE_API_KEY` when `api_key` is `None`.
    pub fn new(api_key: Option<String>, host: &str) -> Result<Self> {
        Self::with_options(api_key, host, None)
    }

    /// Connects to the index at `host` with a custom timeout.
    pub fn with_options(
        api_key: Option<String>,
        host: &str,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = pinecone_key(api_key)?;
        let host = parse_host(host)?;
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        Ok(Self {
            api_key,
            client: http::build_client(timeout)?,
            host,
            timeout,
        })
    }

    /// Looks up the host of the index called `name` and connects to it.
    pub async fn connect(api_key: Option<String>, name: &str) -> Result<Self> {
        Self::connect_with_control_plane(api_key, name, PINECONE_CONTROL_URL).await
    }

    /// Like [`connect`](Self::connect) against a custom control-plane URL.
    pub async fn connect_with_control_plane(
        api_key: Option<String>,
        name: &str,
        control_url: &str,
    ) -> Result<Self> {
        // Key problems are configuration errors; everything after is a retrieval failure.
        let api_key = pinecone_key(api_key)?;
        let headers = pinecone_headers(&api_key)?;
        let host = describe_index(headers, name, control_url)
            .await
            .map_err(|e| wrap_retrieval(format!("describe index {name} failed"), e))?;
        tracing::debug!(index = name, host = %host, "resolved index host");
        Self::with_options(Some(api_key), &host, None)
            .map_err(|e| wrap_retrieval(format!("index {name} has an unusable host {host:?}"), e))
    }

    /// The data-plane host queries are sent to.
    pub fn host(&self) -> &Url {
        &self.host
    }
}

impl fmt::Debug for PineconeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PineconeIndex")
            .field("host", &self.host.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, vector: &[f32], top_k: u32) -> Result<Vec<IndexMatch>> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct QueryRequest<'a> {
            vector: &'a [f32],
            top_k: u32,
            include_metadata: bool,
        }

        #[derive(Deserialize)]
        struct QueryResponse {
            #[serde(default)]
            matches: Vec<IndexMatch>,
        }

        let url = self.host.join("query")?;
        let response = self
            .client
            .post(url)
            .headers(pinecone_headers(&self.api_key)?)
            .json(&QueryRequest {
                vector,
                top_k,
                include_metadata: true,
            })
            .send()
            .await
            .map_err(|e| http::request_error(e, self.timeout))?;
        if !response.status().is_success() {
            return Err(http::error_from_response(response).await);
        }
        let body: QueryResponse = response.json().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse query response: {e}"),
                Some(Box::new(e)),
            )
        })?;
        Ok(body.matches)
    }
}

async fn describe_index(headers: HeaderMap, name: &str, control_url: &str) -> Result<String> {
    #[derive(Deserialize)]
    struct IndexDescription {
        host: String,
    }

    let client = http::build_client(DEFAULT_TIMEOUT)?;
    let url = parse_host(control_url)?.join(&format!("indexes/{name}"))?;
    let response = client
        .get(url)
        .headers(headers)
        .send()
        .await
        .map_err(|e| http::request_error(e, DEFAULT_TIMEOUT))?;
    if !response.status().is_success() {
        return Err(http::error_from_response(response).await);
    }
    let description: IndexDescription = response.json().await.map_err(|e| {
        Error::serialization(
            format!("Failed to parse index description: {e}"),
            Some(Box::new(e)),
        )
    })?;
    Ok(description.host)
}

fn pinecone_key(api_key: Option<String>) -> Result<String> {
    match api_key {
        Some(key) => Ok(key),
        None => env::var(PINECONE_API_KEY)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                Error::config(
                    "API key not provided and PINECONE_API_KEY environment variable not set",
                    Some(PINECONE_API_KEY.to_string()),
                )
            }),
    }
}

fn pinecone_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        "x-pinecone-api-version",
        HeaderValue::from_static(PINECONE_API_VERSION),
    );
    let key = HeaderValue::from_str(api_key).map_err(|_| {
        Error::config(
            "API key contains characters not allowed in an HTTP header",
            Some(PINECONE_API_KEY.to_string()),
        )
    })?;
    headers.insert("api-key", key);
    Ok(headers)
}

fn parse_host(host: &str) -> Result<Url> {
    let mut host = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    if !host.ends_with('/') {
        host.push('/');
    }
    Ok(Url::parse(&host)?)
}
