// Public modules
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod completion;
pub mod error;
pub mod fragment_stream;
pub mod observability;
pub mod render;
pub mod retrieval;
pub mod selector;
pub mod session;
pub mod sse;
pub mod types;

mod http;

// Re-exports
pub use client::{GROQ_API_KEY, Groq};
pub use client_logger::{ClientLogger, TracingLogger};
pub use completion::{CompletionClient, CompletionService};
pub use error::{Error, ErrorKind, Result};
pub use fragment_stream::FragmentStream;
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer};
pub use retrieval::{
    ContextRetriever, Embedder, HuggingFaceEmbedder, IndexMatch, NO_CONTEXT, PINECONE_API_KEY,
    PineconeIndex, VectorIndex, augment_prompt,
};
pub use selector::ModelSelector;
pub use session::{ChatSession, SYSTEM_PROMPT, SessionId, SessionStats, SessionStore};
pub use sse::process_sse;
pub use types::*;
