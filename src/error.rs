use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::io_struct::ErrorBody;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    InvalidPayload(String),

    /// Non-OK answer from `run_sse`; the body is handed back verbatim.
    #[error("{body}")]
    Upstream { status: u16, body: String },

    #[error("[Session] create failed: {status} {body}")]
    SessionCreate { status: u16, body: String },

    #[error("Failed to acquire identity token: {0}")]
    Auth(String),

    #[error("{0}")]
    Transport(#[from] reqwest::Error),
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ProxyError::SessionCreate { .. } | ProxyError::Auth(_) | ProxyError::Transport(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}
