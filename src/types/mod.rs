// Public modules
pub mod chat_completion_chunk;
pub mod chat_completion_params;
pub mod model;
pub mod turn;

// Re-exports
pub use chat_completion_chunk::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
pub use chat_completion_params::{ChatCompletionParams, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
pub use model::{KnownModel, Model};
pub use turn::{Role, Turn};
