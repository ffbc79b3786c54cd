use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client as ReqwestClient;
use url::Url;

use crate::completion::CompletionService;
use crate::error::{Error, Result};
use crate::fragment_stream::FragmentStream;
use crate::http;
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::sse::process_sse;
use crate::{ChatCompletionParams, ClientLogger, TracingLogger};

const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Environment variable holding the completion service key.
pub const GROQ_API_KEY: &str = "GROQ_API_KEY";

/// Client for the Groq chat-completion API.
#[derive(Clone)]
pub struct Groq {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
    logger: Arc<dyn ClientLogger>,
}

impl Groq {
    /// Create a new Groq client.
    ///
    /// The API key can be provided directly or read from the GROQ_API_KEY environment variable.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => env::var(GROQ_API_KEY)
                .ok()
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| {
                    Error::config(
                        "API key not provided and GROQ_API_KEY environment variable not set",
                        Some(GROQ_API_KEY.to_string()),
                    )
                })?,
        };
        if HeaderValue::from_str(&format!("Bearer {api_key}")).is_err() {
            return Err(Error::config(
                "API key contains characters not allowed in an HTTP header",
                Some(GROQ_API_KEY.to_string()),
            ));
        }

        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = http::build_client(timeout)?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
            logger: Arc::new(TracingLogger),
        })
    }

    /// Replace the logger that observes requests and chunks.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// The base URL requests are sent to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|_| {
            Error::config(
                "API key contains characters not allowed in an HTTP header",
                Some(GROQ_API_KEY.to_string()),
            )
        })?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Send a chat completion request and stream the reply.
    ///
    /// Exactly one HTTP request is made.  Failures are returned as-is; nothing is retried.
    pub async fn stream(&self, mut params: ChatCompletionParams) -> Result<FragmentStream> {
        params.stream = true;
        let url = self.base_url.join("chat/completions")?;

        self.logger.log_request(&params);
        CLIENT_REQUESTS.click();
        let start = Instant::now();

        let response = self
            .client
            .post(url)
            .headers(self.default_headers()?)
            .json(&params)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                http::request_error(e, self.timeout)
            })?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            let err = http::error_from_response(response).await;
            tracing::warn!(error = %err, model = %params.model, "chat completion request failed");
            return Err(err);
        }

        let chunks = process_sse(response.bytes_stream());
        Ok(FragmentStream::new(chunks).with_logger(Arc::clone(&self.logger)))
    }
}

impl fmt::Debug for Groq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Groq")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl CompletionService for Groq {
    async fn stream(&self, params: ChatCompletionParams) -> Result<FragmentStream> {
        Groq::stream(self, params).await
    }
}
