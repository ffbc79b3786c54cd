//! Server-Sent Events (SSE) processing for streaming completions.
//!
//! The completion service speaks the OpenAI-compatible dialect of SSE: every event is a block
//! of `data: <json>` lines terminated by a blank line, and the literal `data: [DONE]` closes the
//! stream.  This module turns the raw byte stream of an HTTP response into a stream of parsed
//! [`ChatCompletionChunk`]s.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::observability::{STREAM_BYTES, STREAM_ERRORS, STREAM_EVENTS};
use crate::{ChatCompletionChunk, Error, Result};

/// Marker the service sends as the data of its final event.
const DONE_MARKER: &str = "[DONE]";

/// Process a stream of bytes into a stream of completion chunks.
///
/// Events may be split across network reads at any byte, including inside a multi-byte UTF-8
/// character; bytes are buffered until a full event is available.  The returned stream ends
/// after the `[DONE]` event or when the connection closes, whichever comes first.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    // Convert transport errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (stream, buffer, false),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                // First drain complete events already in the buffer
                while let Some(event_text) = take_event(&mut buffer) {
                    match parse_event(&event_text) {
                        Some(Event::Chunk(chunk)) => {
                            STREAM_EVENTS.click();
                            return Some((chunk, (stream, buffer, false)));
                        }
                        Some(Event::Done) => return None,
                        None => continue,
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        buffer.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => {
                        STREAM_ERRORS.click();
                        return Some((Err(e), (stream, buffer, true)));
                    }
                    None => {
                        // The connection closed; a final event may lack its blank line.
                        if buffer.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        let event_text = std::mem::take(&mut buffer);
                        return match parse_event(&event_text) {
                            Some(Event::Chunk(chunk)) => Some((chunk, (stream, buffer, true))),
                            Some(Event::Done) | None => None,
                        };
                    }
                }
            }
        },
    )
}

enum Event {
    Chunk(Result<ChatCompletionChunk>),
    Done,
}

/// Removes the first complete event from the buffer, returning its bytes without the
/// terminating blank line.
fn take_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (end, separator) = find_separator(buffer)?;
    let event: Vec<u8> = buffer.drain(..end + separator).take(end).collect();
    Some(event)
}

/// Locates the first blank line, accepting both `\n\n` and `\r\n\r\n`.
fn find_separator(buffer: &[u8]) -> Option<(usize, usize)> {
    for i in 0..buffer.len() {
        if buffer[i..].starts_with(b"\n\n") {
            return Some((i, 2));
        }
        if buffer[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
    }
    None
}

/// Parses one event block.  Returns `None` for comment-only or data-less events.
fn parse_event(event_bytes: &[u8]) -> Option<Event> {
    let event_text = match std::str::from_utf8(event_bytes) {
        Ok(text) => text,
        Err(e) => {
            STREAM_ERRORS.click();
            return Some(Event::Chunk(Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            ))));
        }
    };

    let mut event_type = None;
    let mut data_lines = Vec::new();
    for line in event_text.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        } else if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim());
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    let data = data_lines.join("\n");
    if data.trim() == DONE_MARKER {
        return Some(Event::Done);
    }
    if event_type == Some("error") {
        STREAM_ERRORS.click();
        return Some(Event::Chunk(Err(stream_error(&data))));
    }

    #[derive(Deserialize)]
    struct ErrorEnvelope {
        #[serde(default)]
        error: Option<serde_json::Value>,
    }

    if let Ok(ErrorEnvelope { error: Some(error) }) = serde_json::from_str::<ErrorEnvelope>(&data) {
        STREAM_ERRORS.click();
        return Some(Event::Chunk(Err(stream_error(&error.to_string()))));
    }

    match serde_json::from_str::<ChatCompletionChunk>(&data) {
        Ok(chunk) => Some(Event::Chunk(Ok(chunk))),
        Err(e) => {
            STREAM_ERRORS.click();
            Some(Event::Chunk(Err(Error::serialization(
                format!("Failed to parse chunk JSON: {e}"),
                Some(Box::new(e)),
            ))))
        }
    }
}

fn stream_error(data: &str) -> Error {
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
        #[serde(rename = "type")]
        error_type: Option<String>,
    }

    let detail = serde_json::from_str::<ErrorDetail>(data).ok();
    let message = detail
        .as_ref()
        .and_then(|d| d.message.clone())
        .unwrap_or_else(|| data.to_string());
    let error_type = detail
        .and_then(|d| d.error_type)
        .or_else(|| Some("stream_error".to_string()));
    Error::api(500, error_type, message, None)
}
