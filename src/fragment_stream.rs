//! Turns a stream of completion chunks into a stream of reply text.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::Stream;

use crate::observability::{STREAM_DURATION, STREAM_FRAGMENTS};
use crate::{ChatCompletionChunk, ClientLogger, Error};

/// A stream adapter that yields the non-empty text deltas of a completion.
///
/// Chunks without content (the opening role chunk, the closing finish chunk, keep-alives) are
/// dropped silently.  Errors pass through unchanged.  The stream is finite and can only be
/// consumed once.
pub struct FragmentStream {
    inner: Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, Error>> + Send>>,
    logger: Option<Arc<dyn ClientLogger>>,
    reply: String,
    started: Instant,
    finished: bool,
}

impl FragmentStream {
    /// Wraps a chunk stream.
    pub fn new<S>(chunks: S) -> Self
    where
        S: Stream<Item = Result<ChatCompletionChunk, Error>> + Send + 'static,
    {
        Self {
            inner: Box::pin(chunks),
            logger: None,
            reply: String::new(),
            started: Instant::now(),
            finished: false,
        }
    }

    /// Builds a stream that yields `fragments` as if they had arrived over the wire.
    pub fn from_fragments<I, T>(fragments: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let chunks: Vec<Result<ChatCompletionChunk, Error>> = fragments
            .into_iter()
            .map(|text| Ok(ChatCompletionChunk::from_content(text)))
            .collect();
        Self::new(futures::stream::iter(chunks))
    }

    /// Reports every chunk and the final reply to `logger`.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        STREAM_DURATION.add(self.started.elapsed().as_secs_f64());
        if let Some(logger) = &self.logger {
            logger.log_stream_complete(&self.reply);
        }
    }
}

impl fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentStream")
            .field("logged", &self.logger.is_some())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Stream for FragmentStream {
    type Item = Result<String, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.finished {
                return Poll::Ready(None);
            }
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    if let Some(logger) = &self.logger {
                        logger.log_chunk(&chunk);
                    }
                    let Some(content) = chunk.content() else {
                        continue;
                    };
                    let content = content.to_string();
                    STREAM_FRAGMENTS.click();
                    if self.logger.is_some() {
                        self.reply.push_str(&content);
                    }
                    return Poll::Ready(Some(Ok(content)));
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => {
                    self.finish();
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
