use std::collections::VecDeque;
use std::fmt::Display;

use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use serde_json::Value;

use crate::io_struct::ChatCompletionChunk;

pub const DONE_MARKER: &str = "[DONE]";
pub const DONE_EVENT: &[u8] = b"data: [DONE]\n\n";

/// Accumulates raw bytes and hands out complete lines.
///
/// Lines are split on `\n` with an optional preceding `\r`. Whatever follows
/// the last newline stays buffered until the next push, so a line (or a UTF-8
/// sequence) cut by a read boundary is decoded only once it is whole.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + pos;
            let mut line = &self.buf[start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
        }
        self.buf.drain(..start);
        lines
    }

    pub fn remainder(&self) -> &[u8] {
        &self.buf
    }
}

/// Payload of a `data:` line, trimmed. `None` for every other line.
pub fn data_payload(line: &str) -> Option<&str> {
    line.trim().strip_prefix("data:").map(str::trim)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamFrame {
    Ignored,
    Done,
    Text(String),
}

/// Classifies one upstream line. Non-`data:` lines, non-object payloads,
/// malformed JSON and events without `content.parts[0].text` are all ignored.
pub fn classify_line(line: &str) -> UpstreamFrame {
    let Some(payload) = data_payload(line) else {
        return UpstreamFrame::Ignored;
    };
    if payload == DONE_MARKER {
        return UpstreamFrame::Done;
    }
    if !payload.starts_with('{') {
        return UpstreamFrame::Ignored;
    }
    let Ok(event) = serde_json::from_str::<Value>(payload) else {
        log::debug!("Skipping malformed upstream event: {}", payload);
        return UpstreamFrame::Ignored;
    };
    match event.pointer("/content/parts/0/text").and_then(Value::as_str) {
        Some(text) if !text.is_empty() => UpstreamFrame::Text(text.to_string()),
        _ => UpstreamFrame::Ignored,
    }
}

pub fn encode_event(chunk: &ChatCompletionChunk) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(chunk)?;
    Ok(Bytes::from(format!("data: {}\n\n", json)))
}

struct Reframer<S> {
    upstream: Option<S>,
    lines: LineBuffer,
    pending: VecDeque<Bytes>,
    finished: bool,
}

impl<S, E> Reframer<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    fn new(upstream: S) -> Self {
        Self {
            upstream: Some(upstream),
            lines: LineBuffer::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Drops the upstream reader, which closes the upstream connection.
    fn close(&mut self) {
        self.finished = true;
        self.upstream = None;
    }

    fn feed(&mut self, chunk: &[u8]) {
        for line in self.lines.push(chunk) {
            match classify_line(&line) {
                UpstreamFrame::Ignored => {}
                UpstreamFrame::Text(text) => match encode_event(&ChatCompletionChunk::delta(text)) {
                    Ok(event) => self.pending.push_back(event),
                    Err(e) => log::warn!("Failed to encode chunk: {}", e),
                },
                UpstreamFrame::Done => {
                    self.pending.push_back(Bytes::from_static(DONE_EVENT));
                    self.close();
                    return;
                }
            }
        }
    }

    async fn next_event(&mut self) -> Option<Result<Bytes, actix_web::Error>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            let upstream = self.upstream.as_mut()?;
            match upstream.next().await {
                Some(Ok(chunk)) => self.feed(&chunk),
                Some(Err(e)) => {
                    log::error!("[Proxy] Streaming error: {}", e);
                    self.close();
                    return Some(Err(actix_web::error::ErrorBadGateway(format!(
                        "upstream stream failed: {}",
                        e
                    ))));
                }
                None => {
                    if !self.lines.remainder().is_empty() {
                        log::debug!(
                            "Discarding {} trailing bytes without newline",
                            self.lines.remainder().len()
                        );
                    }
                    self.pending.push_back(Bytes::from_static(DONE_EVENT));
                    self.close();
                }
            }
        }
    }
}

impl<S> Drop for Reframer<S> {
    fn drop(&mut self) {
        if !self.finished {
            log::info!("Client went away mid-stream, closing upstream reader");
        }
    }
}

/// Turns the upstream agent SSE body into normalized chunk events, always
/// terminated by `data: [DONE]` unless the upstream read fails.
pub fn reframe<S, E>(upstream: S) -> impl Stream<Item = Result<Bytes, actix_web::Error>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    stream::unfold(Reframer::new(upstream), |mut state| async move {
        let event = state.next_event().await?;
        Some((event, state))
    })
}
