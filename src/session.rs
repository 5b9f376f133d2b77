use actix_web::HttpRequest;
use actix_web::cookie::Cookie;
use reqwest::StatusCode;
use serde_json::json;

use crate::auth::with_bearer;
use crate::error::ProxyError;
use crate::io_struct::IncomingPayload;

pub const USER_ID_COOKIE: &str = "userId";
pub const SESSION_ID_COOKIE: &str = "sessionId";
const SESSION_EXISTS: &str = "Session already exists";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIds {
    pub user_id: String,
    pub session_id: String,
    /// Set when the caller did not present a matching session cookie, in
    /// which case both cookies are written on the response.
    pub is_new: bool,
}

impl SessionIds {
    /// Cookie values win, then ids supplied in the payload, then fresh ones.
    /// Empty strings count as absent.
    pub fn resolve(
        cookie_user_id: Option<&str>,
        cookie_session_id: Option<&str>,
        payload: &IncomingPayload,
    ) -> Self {
        let cookie_session_id = non_empty(cookie_session_id);
        let user_id = non_empty(cookie_user_id)
            .or(non_empty(payload.user_id.as_deref()))
            .map(str::to_string)
            .unwrap_or_else(generate_user_id);
        let session_id = cookie_session_id
            .or(non_empty(payload.session_id.as_deref()))
            .map(str::to_string)
            .unwrap_or_else(generate_session_id);
        let is_new = cookie_session_id != Some(session_id.as_str());
        Self {
            user_id,
            session_id,
            is_new,
        }
    }

    pub fn from_request(req: &HttpRequest, payload: &IncomingPayload) -> Self {
        let user_id = req.cookie(USER_ID_COOKIE);
        let session_id = req.cookie(SESSION_ID_COOKIE);
        Self::resolve(
            user_id.as_ref().map(|c| c.value()),
            session_id.as_ref().map(|c| c.value()),
            payload,
        )
    }

    pub fn cookies(&self) -> [Cookie<'static>; 2] {
        [
            session_cookie(USER_ID_COOKIE, &self.user_id),
            session_cookie(SESSION_ID_COOKIE, &self.session_id),
        ]
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn session_cookie(name: &'static str, value: &str) -> Cookie<'static> {
    Cookie::build(name, value.to_string())
        .path("/")
        .http_only(true)
        .finish()
}

pub fn generate_user_id() -> String {
    let id = uuid::Uuid::new_v4().to_string();
    format!("frontend-{}", &id[..8])
}

pub fn generate_session_id() -> String {
    let id = uuid::Uuid::new_v4().to_string();
    format!("s_{}", &id[..12])
}

pub fn session_url(base_url: &str, app_name: &str, ids: &SessionIds) -> String {
    format!(
        "{}/apps/{}/users/{}/sessions/{}",
        base_url, app_name, ids.user_id, ids.session_id
    )
}

/// Whether a session-creation response means the session is usable.
/// 400 "Session already exists" and 409 are treated as success.
pub fn session_created(status: StatusCode, body: &str) -> bool {
    status.is_success()
        || status == StatusCode::CONFLICT
        || (status == StatusCode::BAD_REQUEST && body.contains(SESSION_EXISTS))
}

/// Creates the upstream session, tolerating one that already exists.
pub async fn ensure_session(
    client: &reqwest::Client,
    base_url: &str,
    app_name: &str,
    ids: &SessionIds,
    token: Option<&str>,
) -> Result<(), ProxyError> {
    let url = session_url(base_url, app_name, ids);
    let request = client
        .post(&url)
        .json(&json!({ "state": { "frontend": true } }));
    let resp = with_bearer(request, token).send().await.map_err(|e| {
        log::error!("[Proxy] Failed to create session: {}", e);
        ProxyError::from(e)
    })?;

    let status = resp.status();
    // drain so the connection goes back to the pool
    let body = resp.text().await?;
    if session_created(status, &body) {
        log::debug!(
            "[Session] {} ready for {} ({})",
            ids.session_id,
            ids.user_id,
            status
        );
        return Ok(());
    }

    log::error!(
        "[Proxy] Failed to create session: {} {}",
        status.as_u16(),
        body
    );
    Err(ProxyError::SessionCreate {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(user_id: Option<&str>, session_id: Option<&str>) -> IncomingPayload {
        IncomingPayload {
            user_id: user_id.map(str::to_string),
            session_id: session_id.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_cookies_take_precedence() {
        let ids = SessionIds::resolve(
            Some("cookie-user"),
            Some("cookie-session"),
            &payload(Some("p-user"), Some("p-session")),
        );
        assert_eq!(ids.user_id, "cookie-user");
        assert_eq!(ids.session_id, "cookie-session");
        assert!(!ids.is_new);
    }

    #[test]
    fn test_payload_ids_used_without_cookies() {
        let ids = SessionIds::resolve(None, None, &payload(Some("p-user"), Some("p-session")));
        assert_eq!(ids.user_id, "p-user");
        assert_eq!(ids.session_id, "p-session");
        assert!(ids.is_new);
    }

    #[test]
    fn test_fresh_ids_generated() {
        let ids = SessionIds::resolve(None, None, &payload(None, None));
        assert!(ids.user_id.starts_with("frontend-"));
        assert_eq!(ids.user_id.len(), "frontend-".len() + 8);
        assert!(ids.session_id.starts_with("s_"));
        assert_eq!(ids.session_id.len(), "s_".len() + 12);
        assert!(ids.is_new);

        let other = SessionIds::resolve(None, None, &payload(None, None));
        assert_ne!(ids.session_id, other.session_id);
    }

    #[test]
    fn test_empty_cookie_counts_as_absent() {
        let ids = SessionIds::resolve(Some(""), Some(""), &payload(None, None));
        assert!(ids.user_id.starts_with("frontend-"));
        assert!(ids.session_id.starts_with("s_"));
        assert!(ids.is_new);
    }

    #[test]
    fn test_user_cookie_only_is_still_new_session() {
        let ids = SessionIds::resolve(Some("cookie-user"), None, &payload(None, None));
        assert_eq!(ids.user_id, "cookie-user");
        assert!(ids.is_new);
    }

    #[test]
    fn test_cookie_attributes() {
        let ids = SessionIds::resolve(Some("u"), Some("s"), &payload(None, None));
        let [user, session] = ids.cookies();
        assert_eq!(user.name(), "userId");
        assert_eq!(user.value(), "u");
        assert_eq!(user.path(), Some("/"));
        assert_eq!(user.http_only(), Some(true));
        assert!(user.expires().is_none());
        assert_eq!(session.name(), "sessionId");
        assert_eq!(session.value(), "s");
    }

    #[test]
    fn test_session_url() {
        let ids = SessionIds {
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            is_new: true,
        };
        assert_eq!(
            session_url("http://up", "workmatch", &ids),
            "http://up/apps/workmatch/users/u1/sessions/s1"
        );
    }

    #[test]
    fn test_session_created_rules() {
        assert!(session_created(StatusCode::OK, ""));
        assert!(session_created(StatusCode::CONFLICT, "dup"));
        assert!(session_created(
            StatusCode::BAD_REQUEST,
            "{\"detail\":\"Session already exists: s1\"}"
        ));
        assert!(!session_created(StatusCode::BAD_REQUEST, "bad state"));
        assert!(!session_created(StatusCode::INTERNAL_SERVER_ERROR, "boom"));
        assert!(!session_created(StatusCode::UNAUTHORIZED, ""));
    }
}
