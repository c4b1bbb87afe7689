//! Server-Sent Events (SSE) processing for streamed chat completions.
//!
//! OpenAI-compatible providers answer a `stream: true` request with a
//! `text/event-stream` body whose events each carry one `data:` payload: a
//! JSON [`ChatCompletionChunk`], an inline `{"error": ...}` object, or the
//! literal `[DONE]` terminator.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::types::ChatCompletionChunk;
use crate::{Error, Result};

/// Payload that marks the end of a stream.
const DONE_MARKER: &str = "[DONE]";

/// Process a stream of bytes into a stream of chat-completion chunks.
///
/// Events may be split across arbitrary byte boundaries, including inside a
/// multi-byte UTF-8 sequence.  The returned stream ends at `[DONE]` or when
/// the underlying byte stream is exhausted.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
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
                if let Some(raw) = take_event(&mut buffer) {
                    match parse_event(&raw) {
                        Event::Skip => continue,
                        Event::Done => return None,
                        Event::Chunk(chunk) => return Some((chunk, (stream, buffer, false))),
                    }
                }

                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => return Some((Err(e), (stream, buffer, true))),
                    None => {
                        // A final event is allowed to omit its blank-line terminator.
                        if buffer.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        let raw = std::mem::take(&mut buffer);
                        return match parse_event(&raw) {
                            Event::Skip | Event::Done => None,
                            Event::Chunk(chunk) => Some((chunk, (stream, buffer, true))),
                        };
                    }
                }
            }
        },
    )
}

enum Event {
    Skip,
    Done,
    Chunk(Result<ChatCompletionChunk>),
}

/// Removes one complete event (terminated by a blank line) from `buffer`.
fn take_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (end, delimiter) = find_delimiter(buffer)?;
    let event = buffer[..end].to_vec();
    buffer.drain(..end + delimiter);
    Some(event)
}

fn find_delimiter(buffer: &[u8]) -> Option<(usize, usize)> {
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

/// Parse one raw event into a chunk.
///
/// Multiple `data:` lines are joined with newlines; `event:`, `id:`, `retry:`
/// and comment lines are ignored.
fn parse_event(raw: &[u8]) -> Event {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => {
            return Event::Chunk(Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            )));
        }
    };

    let mut data: Option<String> = None;
    for line in text.lines() {
        let Some(value) = line.strip_prefix("data:") else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match data.as_mut() {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }

    let Some(data) = data else {
        return Event::Skip;
    };
    let data = data.trim();
    if data.is_empty() {
        return Event::Skip;
    }
    if data == DONE_MARKER {
        return Event::Done;
    }
    Event::Chunk(parse_chunk(data))
}

#[derive(Deserialize)]
struct InlineError {
    error: InlineErrorDetail,
}

#[derive(Deserialize)]
struct InlineErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

fn parse_chunk(data: &str) -> Result<ChatCompletionChunk> {
    let value: serde_json::Value = serde_json::from_str(data).map_err(|e| {
        Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        )
    })?;

    if value.get("error").is_some() {
        let inline: InlineError = serde_json::from_value(value)?;
        let status = inline
            .error
            .code
            .as_ref()
            .and_then(|code| code.as_u64())
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(500);
        let message = inline
            .error
            .message
            .unwrap_or_else(|| "provider reported an error".to_string());
        return Err(Error::api(status, inline.error.error_type, message));
    }

    serde_json::from_value(value).map_err(|e| {
        Error::serialization(
            format!("Failed to parse chunk: {e}"),
            Some(Box::new(e)),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn bytes_stream(
        parts: Vec<&'static [u8]>,
    ) -> impl Stream<Item = std::result::Result<Bytes, io::Error>> + Unpin {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p))))
    }

    #[tokio::test]
    async fn parse_content_chunks() {
        let data: &[u8] = b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hello\"}}]}\n\n\
data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\" World\"}}]}\n\n";
        let mut sse = Box::pin(process_sse(bytes_stream(vec![data])));

        let first = sse.next().await.unwrap().unwrap();
        assert_eq!(first.fragment(), Some("Hello"));
        let second = sse.next().await.unwrap().unwrap();
        assert_eq!(second.fragment(), Some(" World"));
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn done_marker_ends_stream() {
        let data: &[u8] = b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n\
data: [DONE]\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n";
        let mut sse = Box::pin(process_sse(bytes_stream(vec![data])));

        assert_eq!(sse.next().await.unwrap().unwrap().fragment(), Some("a"));
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn handle_split_event() {
        let chunk1: &[u8] = b"data: {\"choices\":[{\"delta\":";
        let chunk2: &[u8] = b"{\"content\":\"hi\"}}]}\n";
        let chunk3: &[u8] = b"\ndata: [DONE]\n\n";
        let mut sse = Box::pin(process_sse(bytes_stream(vec![chunk1, chunk2, chunk3])));

        assert_eq!(sse.next().await.unwrap().unwrap().fragment(), Some("hi"));
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn multibyte_character_split_across_chunks() {
        // "é" is 0xC3 0xA9.
        let chunk1: &[u8] = b"data: {\"choices\":[{\"delta\":{\"content\":\"caf\xC3";
        let chunk2: &[u8] = b"\xA9\"}}]}\n\n";
        let mut sse = Box::pin(process_sse(bytes_stream(vec![chunk1, chunk2])));

        assert_eq!(sse.next().await.unwrap().unwrap().fragment(), Some("café"));
    }

    #[tokio::test]
    async fn comments_and_crlf_are_tolerated() {
        let data: &[u8] = b": keep-alive\r\n\r\nevent: message\r\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\n\r\n";
        let mut sse = Box::pin(process_sse(bytes_stream(vec![data])));

        assert_eq!(sse.next().await.unwrap().unwrap().fragment(), Some("x"));
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn inline_error_event() {
        let data: &[u8] =
            b"data: {\"error\":{\"message\":\"quota exceeded\",\"type\":\"insufficient_quota\",\"code\":429}}\n\n";
        let mut sse = Box::pin(process_sse(bytes_stream(vec![data])));

        let err = sse.next().await.unwrap().unwrap_err();
        assert_eq!(err.status_code(), Some(429));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        let data: &[u8] = b"data: {not json}\n\n";
        let mut sse = Box::pin(process_sse(bytes_stream(vec![data])));

        let err = sse.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("Failed to parse event JSON"));
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let parts: Vec<std::result::Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
            )),
            Err(io::Error::other("connection reset")),
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n",
            )),
        ];
        let mut sse = Box::pin(process_sse(stream::iter(parts)));

        assert_eq!(sse.next().await.unwrap().unwrap().fragment(), Some("partial"));
        let err = sse.next().await.unwrap().unwrap_err();
        assert!(err.is_streaming());
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn trailing_event_without_blank_line() {
        let data: &[u8] = b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}";
        let mut sse = Box::pin(process_sse(bytes_stream(vec![data])));

        assert_eq!(sse.next().await.unwrap().unwrap().fragment(), Some("tail"));
        assert!(sse.next().await.is_none());
    }
}
