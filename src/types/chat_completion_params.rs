use serde::{Deserialize, Serialize};

use crate::types::{Model, Turn};

/// Sampling temperature used for every tutor request.  Zero asks for deterministic output.
pub const DEFAULT_TEMPERATURE: f32 = 0.0;

/// Upper bound on the tokens generated for one reply.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Request body for `POST chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionParams {
    /// The model that will complete the conversation.
    pub model: Model,

    /// The conversation so far, system turn first.
    pub messages: Vec<Turn>,

    /// Sampling temperature.
    pub temperature: f32,

    /// Maximum number of tokens to generate.
    pub max_tokens: u32,

    /// Whether the reply is delivered as server-sent events.
    pub stream: bool,

    /// Stop sequences.  Serialized as `null` when unset.
    pub stop: Option<Vec<String>>,
}

impl ChatCompletionParams {
    /// Create streaming parameters with the tutor's fixed sampling settings.
    pub fn new(model: Model, messages: Vec<Turn>) -> Self {
        Self {
            model,
            messages,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: true,
            stop: None,
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the maximum tokens per reply.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}
