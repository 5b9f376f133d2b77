use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::RequestBuilder;

use crate::config::AuthMode;
use crate::error::ProxyError;

/// Source of bearer identity tokens for calls to the upstream service.
#[async_trait]
pub trait TokenProvider: Send + Sync + Debug {
    /// Returns `None` when upstream calls should go out unauthenticated.
    async fn identity_token(&self, audience: &str) -> Result<Option<String>, ProxyError>;
}

#[derive(Debug, Default)]
pub struct NoAuth;

#[async_trait]
impl TokenProvider for NoAuth {
    async fn identity_token(&self, _audience: &str) -> Result<Option<String>, ProxyError> {
        Ok(None)
    }
}

#[derive(Debug)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn identity_token(&self, _audience: &str) -> Result<Option<String>, ProxyError> {
        Ok(Some(self.token.clone()))
    }
}

/// Mints an identity token per request from the compute metadata server.
#[derive(Debug)]
pub struct MetadataServer {
    client: reqwest::Client,
    metadata_url: String,
}

impl MetadataServer {
    pub fn new(client: reqwest::Client, metadata_url: impl Into<String>) -> Self {
        Self {
            client,
            metadata_url: metadata_url.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for MetadataServer {
    async fn identity_token(&self, audience: &str) -> Result<Option<String>, ProxyError> {
        let resp = self
            .client
            .get(&self.metadata_url)
            .header("Metadata-Flavor", "Google")
            .query(&[("audience", audience)])
            .send()
            .await
            .map_err(|e| ProxyError::Auth(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ProxyError::Auth(e.to_string()))?;
        if !status.is_success() {
            return Err(ProxyError::Auth(format!(
                "metadata server returned {}: {}",
                status.as_u16(),
                body
            )));
        }
        let token = body.trim();
        if token.is_empty() {
            return Err(ProxyError::Auth(
                "metadata server returned an empty token".to_string(),
            ));
        }
        Ok(Some(token.to_string()))
    }
}

pub fn build_provider(mode: &AuthMode, client: &reqwest::Client) -> Arc<dyn TokenProvider> {
    match mode {
        AuthMode::None => Arc::new(NoAuth),
        AuthMode::Static(token) => Arc::new(StaticToken::new(token.clone())),
        AuthMode::Metadata { metadata_url } => {
            Arc::new(MetadataServer::new(client.clone(), metadata_url.clone()))
        }
    }
}

pub fn with_bearer(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}
