//! Chat client for the stream proxy.
//!
//! A [`ChatSession`] owns the transcript and the loading flag of one
//! conversation. Each submitted message gets an assistant message that is
//! filled from the proxy's SSE stream; failed attempts are retried with a
//! linear backoff and keep appending to the same assistant message.

pub mod transcript;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::ClientConfig;
use crate::sse::{DONE_MARKER, LineBuffer, data_payload};
pub use transcript::{ChatMessage, Role, Transcript};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("proxy answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("expected text/event-stream, got '{0}'")]
    ContentType(String),

    #[error("malformed stream event: {0}")]
    Malformed(String),
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// Opens one SSE stream for a user message.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, text: &str) -> Result<ByteStream, ClientError>;
}

/// Talks to `POST {proxy}/api/stream`, keeping the proxy's session cookies.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/stream", config.proxy_url),
        })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, text: &str) -> Result<ByteStream, ClientError> {
        let body = json!({
            "newMessageContent": { "parts": [{ "type": "text", "text": text }] }
        });
        let resp = self.client.post(&self.endpoint).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("text/event-stream") {
            return Err(ClientError::ContentType(content_type));
        }

        Ok(Box::pin(
            resp.bytes_stream().map(|r| r.map_err(ClientError::from)),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            step: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            step: config.retry_step,
        }
    }

    /// Wait before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.step * attempt
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Skip,
    Done,
    Delta(String),
}

/// Interprets one line of the proxy's normalized stream.
pub fn parse_stream_line(line: &str) -> Result<StreamEvent, ClientError> {
    let Some(payload) = data_payload(line) else {
        return Ok(StreamEvent::Skip);
    };
    if payload.is_empty() {
        return Ok(StreamEvent::Skip);
    }
    if payload == DONE_MARKER {
        return Ok(StreamEvent::Done);
    }
    let chunk: Value = serde_json::from_str(payload)
        .map_err(|e| ClientError::Malformed(format!("{}: {}", e, payload)))?;
    match chunk
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
    {
        Some(delta) if !delta.is_empty() => Ok(StreamEvent::Delta(delta.to_string())),
        _ => Ok(StreamEvent::Skip),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub assistant_id: String,
    pub attempts: u32,
    pub completed: bool,
}

pub struct ChatSession<T> {
    transport: T,
    policy: RetryPolicy,
    transcript: Transcript,
    loading: bool,
}

impl ChatSession<HttpTransport> {
    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self::new(
            HttpTransport::new(config)?,
            RetryPolicy::from_config(config),
        ))
    }
}

impl<T: ChatTransport> ChatSession<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            transcript: Transcript::new(),
            loading: false,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub async fn submit(&mut self, input: &str) -> Option<SubmitOutcome> {
        self.submit_with(input, |_| {}).await
    }

    /// Sends `input` and streams the reply into the transcript, calling
    /// `on_delta` for every appended piece. Blank input is ignored.
    pub async fn submit_with<F>(&mut self, input: &str, mut on_delta: F) -> Option<SubmitOutcome>
    where
        F: FnMut(&str) + Send,
    {
        let text = input.trim();
        if text.is_empty() {
            return None;
        }

        self.transcript.push(Role::User, text);
        let assistant_id = self.transcript.push(Role::Assistant, "");
        self.loading = true;

        let mut attempts = 0;
        let mut completed = false;
        while attempts < self.policy.max_attempts {
            attempts += 1;
            match self.stream_reply(text, &assistant_id, &mut on_delta).await {
                Ok(()) => {
                    completed = true;
                    break;
                }
                Err(e) => {
                    log::warn!("Attempt {} failed: {}", attempts, e);
                    if attempts < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.delay_after(attempts)).await;
                    }
                }
            }
        }
        if !completed {
            log::error!("Giving up after {} attempts", attempts);
        }

        self.loading = false;
        Some(SubmitOutcome {
            assistant_id,
            attempts,
            completed,
        })
    }

    async fn stream_reply<F>(
        &mut self,
        text: &str,
        assistant_id: &str,
        on_delta: &mut F,
    ) -> Result<(), ClientError>
    where
        F: FnMut(&str) + Send,
    {
        let mut stream = self.transport.open(text).await?;
        let mut lines = LineBuffer::new();
        while let Some(chunk) = stream.next().await {
            for line in lines.push(&chunk?) {
                match parse_stream_line(&line)? {
                    StreamEvent::Skip => {}
                    StreamEvent::Done => return Ok(()),
                    StreamEvent::Delta(delta) => {
                        self.transcript.append_content(assistant_id, &delta);
                        on_delta(&delta);
                    }
                }
            }
        }
        Ok(())
    }
}
