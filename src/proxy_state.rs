use std::sync::Arc;

use actix_web::http::header::CACHE_CONTROL;
use actix_web::{HttpRequest, HttpResponse};

use crate::auth::{TokenProvider, build_provider, with_bearer};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::io_struct::{INVALID_MESSAGE_FORMAT, IncomingPayload, RunSseRequest, TextPart};
use crate::session::{SessionIds, ensure_session};
use crate::sse::reframe;

#[derive(Debug, Clone)]
pub struct ProxyState {
    pub config: ProxyConfig,
    pub client: reqwest::Client,
    pub tokens: Arc<dyn TokenProvider>,
}

impl ProxyState {
    pub fn new(config: ProxyConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let tokens = build_provider(&config.auth, &client);
        Ok(Self {
            config,
            client,
            tokens,
        })
    }

    pub fn with_token_provider(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn run_sse_url(&self) -> String {
        format!("{}/run_sse", self.config.upstream_url)
    }

    /// Forwards one user message to `run_sse` and returns the response when it
    /// is OK; otherwise the upstream status and body as an error.
    pub async fn run_sse(
        &self,
        ids: &SessionIds,
        parts: Vec<TextPart>,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ProxyError> {
        let payload = RunSseRequest::new(
            &self.config.app_name,
            &ids.user_id,
            &ids.session_id,
            parts,
        );
        let request = self.client.post(self.run_sse_url()).json(&payload);
        let resp = with_bearer(request, token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            log::warn!("[Proxy] run_sse answered {}: {}", status.as_u16(), body);
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    pub async fn handle(&self, req: &HttpRequest, body: &[u8]) -> Result<HttpResponse, ProxyError> {
        let payload: IncomingPayload = serde_json::from_slice(body)
            .map_err(|e| ProxyError::InvalidPayload(format!("Invalid JSON body: {}", e)))?;
        let parts = payload
            .text_parts()
            .ok_or_else(|| ProxyError::InvalidPayload(INVALID_MESSAGE_FORMAT.to_string()))?;

        let ids = SessionIds::from_request(req, &payload);
        log::info!(
            "[Proxy] message for user={} session={} (new session: {})",
            ids.user_id,
            ids.session_id,
            ids.is_new
        );

        let token = self
            .tokens
            .identity_token(&self.config.upstream_url)
            .await?;
        ensure_session(
            &self.client,
            &self.config.upstream_url,
            &self.config.app_name,
            &ids,
            token.as_deref(),
        )
        .await?;

        let upstream = self.run_sse(&ids, parts, token.as_deref()).await?;

        let mut builder = HttpResponse::Ok();
        builder
            .content_type("text/event-stream")
            .insert_header((CACHE_CONTROL, "no-cache"));
        if ids.is_new {
            for cookie in ids.cookies() {
                builder.cookie(cookie);
            }
        }
        Ok(builder.streaming(reframe(Box::pin(upstream.bytes_stream()))))
    }
}
