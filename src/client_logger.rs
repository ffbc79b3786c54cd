//! Logging hook for completion client operations.
//!
//! This module provides the [`ClientLogger`] trait that allows users to capture every request
//! sent through the [`Groq`](crate::Groq) client and every chunk it decodes, plus
//! [`TracingLogger`], which forwards them to `tracing` at debug level.

use crate::{ChatCompletionChunk, ChatCompletionParams};

/// A trait for logging completion client operations.
///
/// # Example
///
/// ```rust,ignore
/// use codetutor::{ChatCompletionChunk, ChatCompletionParams, ClientLogger};
/// use std::sync::Mutex;
///
/// struct CountingLogger {
///     chunks: Mutex<usize>,
/// }
///
/// impl ClientLogger for CountingLogger {
///     fn log_request(&self, _: &ChatCompletionParams) {}
///
///     fn log_chunk(&self, _: &ChatCompletionChunk) {
///         *self.chunks.lock().unwrap() += 1;
///     }
///
///     fn log_stream_complete(&self, _: &str) {}
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log a request just before it is sent.
    fn log_request(&self, params: &ChatCompletionParams);

    /// Log one decoded chunk, including chunks that carry no text.
    fn log_chunk(&self, chunk: &ChatCompletionChunk);

    /// Log the full reply once the stream is exhausted.
    fn log_stream_complete(&self, text: &str);
}

/// A [`ClientLogger`] that emits `tracing` debug events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl ClientLogger for TracingLogger {
    fn log_request(&self, params: &ChatCompletionParams) {
        tracing::debug!(
            model = %params.model,
            messages = params.messages.len(),
            max_tokens = params.max_tokens,
            temperature = params.temperature,
            "sending chat completion request"
        );
    }

    fn log_chunk(&self, chunk: &ChatCompletionChunk) {
        tracing::trace!(
            id = %chunk.id,
            content = chunk.content().unwrap_or_default(),
            finish_reason = chunk.finish_reason().unwrap_or_default(),
            "received completion chunk"
        );
    }

    fn log_stream_complete(&self, text: &str) {
        tracing::debug!(chars = text.chars().count(), "completion stream finished");
    }
}
