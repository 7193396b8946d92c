//! Incremental decoding of streamed response bodies
//!
//! Network chunks do not respect line boundaries, so bytes are buffered until a
//! full line is available. Two framings are supported: server-sent events
//! (`data: ...` lines ending with `[DONE]`) and newline-delimited JSON.

use super::BoxStream;
use anyhow::anyhow;
use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use tracing::{debug, warn};

/// Splits a byte stream into complete lines
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Flush whatever is left once the body ends
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buffer).trim_end_matches('\r').to_string();
        self.buffer.clear();
        Some(rest)
    }
}

struct LineState<S> {
    body: Pin<Box<S>>,
    decoder: LineDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Turn a chunked body into a stream of complete lines
pub fn lines<S, B, E>(body: S) -> BoxStream<'static, String>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = LineState {
        body: Box::pin(body),
        decoder: LineDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.pending.pop_front() {
                return Some((Ok(line), state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let completed = state.decoder.push(chunk.as_ref());
                    state.pending.extend(completed);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(anyhow!("Stream error: {}", e)), state));
                }
                None => {
                    state.finished = true;
                    if let Some(rest) = state.decoder.finish() {
                        state.pending.push_back(rest);
                    }
                }
            }
        }
    }))
}

/// Payloads of `data:` lines, ending at `[DONE]` or end of body
pub fn sse_data<S, B, E>(body: S) -> BoxStream<'static, String>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let events = lines(body)
        .filter_map(|line| {
            futures::future::ready(match line {
                Ok(line) => line
                    .strip_prefix("data:")
                    .map(|data| Ok(data.trim().to_string())),
                Err(e) => Some(Err(e)),
            })
        })
        .take_while(|item| {
            let done = matches!(item, Ok(data) if data == "[DONE]");
            if done {
                debug!("Received streaming response end marker");
            }
            futures::future::ready(!done)
        })
        .filter(|item| futures::future::ready(!matches!(item, Ok(data) if data.is_empty())));

    Box::pin(events)
}

/// Non-blank lines of a newline-delimited JSON body
pub fn ndjson<S, B, E>(body: S) -> BoxStream<'static, String>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let records = lines(body).filter(|item| {
        futures::future::ready(!matches!(item, Ok(line) if line.trim().is_empty()))
    });
    Box::pin(records)
}

/// Parse one payload, logging and skipping malformed data
pub fn parse_json<T: DeserializeOwned>(data: &str) -> Option<T> {
    match serde_json::from_str::<T>(data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to parse streaming response chunk: {} - data: {}", e, data);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(chunks: &[&'static str]) -> impl Stream<Item = Result<&'static [u8], std::io::Error>> + Send {
        stream::iter(chunks.iter().copied().map(|c| Ok(c.as_bytes())).collect::<Vec<_>>())
    }

    async fn collect(stream: BoxStream<'static, String>) -> Vec<String> {
        stream.map(|item| item.unwrap()).collect().await
    }

    #[test]
    fn test_line_decoder_buffers_partial_lines() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.push(b":1}\r\ndata: x\n"), vec!["data: {\"a\":1}", "data: x"]);
        assert!(decoder.finish().is_none());

        decoder.push(b"tail");
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
    }

    #[tokio::test]
    async fn test_sse_data_split_across_chunks() {
        let events = collect(sse_data(body(&[
            "event: message\ndata: {\"n\":",
            "1}\n\n: keep-alive\n\ndata: {\"n\":2}\n",
            "\ndata: [DONE]\n\ndata: {\"n\":3}\n\n",
        ])))
        .await;

        assert_eq!(events, vec!["{\"n\":1}", "{\"n\":2}"]);
    }

    #[tokio::test]
    async fn test_sse_data_without_done_marker() {
        let events = collect(sse_data(body(&["data: a\n\ndata: b"]))).await;
        assert_eq!(events, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_ndjson_skips_blank_lines() {
        let records = collect(ndjson(body(&["{\"a\":1}\n\n{\"a\"", ":2}\n"]))).await;
        assert_eq!(records, vec!["{\"a\":1}", "{\"a\":2}"]);
    }

    #[tokio::test]
    async fn test_transport_error_surfaces() {
        let failing = stream::iter(vec![
            Ok::<&'static [u8], std::io::Error>(b"data: a\n"),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let items: Vec<_> = sse_data(failing).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].as_ref().unwrap_err().to_string().contains("reset"));
    }

    #[test]
    fn test_parse_json_skips_garbage() {
        assert!(parse_json::<serde_json::Value>("{not json").is_none());
        assert!(parse_json::<serde_json::Value>("{\"ok\":true}").is_some());
    }
}
