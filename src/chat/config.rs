//! Configuration types for the tutor REPL.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved configuration the
//! binary runs with.

use arrrg_derive::CommandLine;

use crate::error::{Error, Result};
use crate::retrieval::{DEFAULT_INDEX_NAME, DEFAULT_TOP_K};
use crate::selector::ModelSelector;
use crate::session::SYSTEM_PROMPT;

/// Environment file read at startup when none is given.
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Command-line arguments for the codetutor-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to start with.
    #[arrrg(optional, "Model to start with (default: first catalog entry)", "MODEL")]
    pub model: Option<String>,

    /// Comma-separated model catalog.
    #[arrrg(optional, "Comma-separated list of selectable models", "MODELS")]
    pub models: Option<String>,

    /// System prompt that seeds every session.
    #[arrrg(optional, "System prompt for new sessions", "PROMPT")]
    pub system: Option<String>,

    /// Enable context retrieval from the start.
    #[arrrg(flag, "Augment questions with retrieved context")]
    pub rag: bool,

    /// Number of passages to retrieve.
    #[arrrg(optional, "Passages to retrieve per question (default: 3)", "K")]
    pub top_k: Option<u32>,

    /// Vector index name.
    #[arrrg(optional, "Vector index to query (default: new-medical-bot)", "INDEX")]
    pub index: Option<String>,

    /// Path of the environment file.
    #[arrrg(optional, "Environment file to load (default: .env)", "PATH")]
    pub env_file: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat run.
///
/// Holds the resolved values after applying defaults to the command-line arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Model to select at startup; `None` selects the first catalog entry.
    pub model: Option<String>,

    /// Comma-separated catalog; `None` uses the built-in catalog.
    pub models: Option<String>,

    /// Instructions every new session is seeded with.
    pub system_prompt: String,

    /// Whether questions are augmented with retrieved context.
    pub retrieval_enabled: bool,

    /// Passages to retrieve per question.
    pub top_k: u32,

    /// Vector index name.
    pub index_name: String,

    /// Environment file loaded at startup.
    pub env_file: String,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a ChatConfig with default values.
    pub fn new() -> Self {
        Self {
            model: None,
            models: None,
            system_prompt: SYSTEM_PROMPT.to_string(),
            retrieval_enabled: false,
            top_k: DEFAULT_TOP_K,
            index_name: DEFAULT_INDEX_NAME.to_string(),
            env_file: DEFAULT_ENV_FILE.to_string(),
            use_color: true,
        }
    }

    /// Sets the starting model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the model catalog.
    pub fn with_models(mut self, models: impl Into<String>) -> Self {
        self.models = Some(models.into());
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets whether retrieval starts enabled.
    pub fn with_retrieval(mut self, enabled: bool) -> Self {
        self.retrieval_enabled = enabled;
        self
    }

    /// Sets the number of passages to retrieve.
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Builds the model selector this configuration describes.
    ///
    /// # Errors
    ///
    /// A validation error if the catalog is empty, `top_k` is zero, or the starting model is not
    /// in the catalog.
    pub fn selector(&self) -> Result<ModelSelector> {
        if self.top_k == 0 {
            return Err(Error::validation(
                "top-k must be at least 1",
                Some("top_k".to_string()),
            ));
        }
        let mut selector = match &self.models {
            Some(list) => ModelSelector::from_list(list)?,
            None => ModelSelector::default(),
        };
        if let Some(model) = &self.model {
            selector.select(model)?;
        }
        Ok(selector)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let defaults = ChatConfig::new();
        ChatConfig {
            model: args.model,
            models: args.models,
            system_prompt: args.system.unwrap_or(defaults.system_prompt),
            retrieval_enabled: args.rag,
            top_k: args.top_k.unwrap_or(defaults.top_k),
            index_name: args.index.unwrap_or(defaults.index_name),
            env_file: args.env_file.unwrap_or(defaults.env_file),
            use_color: !args.no_color,
        }
    }
}
