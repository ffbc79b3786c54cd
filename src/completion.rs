//! The completion seam: a transport trait and a model-bound client on top of it.

use std::sync::Arc;

use crate::error::Result;
use crate::fragment_stream::FragmentStream;
use crate::types::{
    ChatCompletionParams, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, Model, Turn,
};

/// A hosted service that can stream chat completions.
///
/// [`Groq`](crate::Groq) is the production implementation; tests substitute scripted fakes.
#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    /// Issue one streaming completion request.
    async fn stream(&self, params: ChatCompletionParams) -> Result<FragmentStream>;
}

/// A completion client bound to one model.
///
/// Cheap to construct; the orchestrator builds one per interaction for whatever model is
/// selected at that moment.
#[derive(Clone)]
pub struct CompletionClient {
    service: Arc<dyn CompletionService>,
    model: Model,
    temperature: f32,
    max_tokens: u32,
}

impl CompletionClient {
    /// Create a client for `model` over `service`.
    pub fn new(service: Arc<dyn CompletionService>, model: Model) -> Self {
        Self {
            service,
            model,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Override the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the maximum tokens per reply.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// The model this client asks for.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Build the request parameters for `history` without sending them.
    pub fn params(&self, history: &[Turn]) -> ChatCompletionParams {
        ChatCompletionParams::new(self.model.clone(), history.to_vec())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }

    /// Send the full ordered history and stream the reply.
    ///
    /// An empty history is sent as-is; the service decides whether that is acceptable.
    pub async fn stream_completion(&self, history: &[Turn]) -> Result<FragmentStream> {
        self.service.stream(self.params(history)).await
    }
}
