use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::http::StatusCode;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use bytes::Bytes;
use futures::{StreamExt, stream};
use serde_json::Value;

/// Behaviour of the mock agent service.
#[derive(Clone, Debug)]
pub struct MockUpstreamConfig {
    pub session_status: u16,
    pub session_body: String,
    pub run_status: u16,
    /// Body of `run_sse`, sent as one write per entry.
    pub run_chunks: Vec<String>,
    pub chunk_delay_ms: u64,
}

impl Default for MockUpstreamConfig {
    fn default() -> Self {
        Self {
            session_status: 200,
            session_body: "{}".to_string(),
            run_status: 200,
            run_chunks: Vec::new(),
            chunk_delay_ms: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionCall {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub body: Value,
    pub authorization: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RunCall {
    pub body: Value,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct Recorded {
    session_calls: Vec<SessionCall>,
    run_calls: Vec<RunCall>,
}

struct MockState {
    config: MockUpstreamConfig,
    recorded: Arc<Mutex<Recorded>>,
}

pub struct MockUpstream {
    pub url: String,
    recorded: Arc<Mutex<Recorded>>,
    handle: ServerHandle,
}

impl MockUpstream {
    pub async fn start(config: MockUpstreamConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let state = web::Data::new(MockState {
            config,
            recorded: recorded.clone(),
        });

        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .route(
                    "/apps/{app}/users/{user}/sessions/{session}",
                    web::post().to(create_session),
                )
                .route("/run_sse", web::post().to(run_sse))
        })
        .workers(1)
        .listen(listener)
        .unwrap()
        .run();
        let handle = server.handle();
        actix_web::rt::spawn(server);

        Self {
            url: format!("http://127.0.0.1:{}", port),
            recorded,
            handle,
        }
    }

    pub fn session_calls(&self) -> Vec<SessionCall> {
        self.recorded.lock().unwrap().session_calls.clone()
    }

    pub fn run_calls(&self) -> Vec<RunCall> {
        self.recorded.lock().unwrap().run_calls.clone()
    }

    pub async fn stop(self) {
        self.handle.stop(true).await;
    }
}

fn authorization(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn create_session(
    req: HttpRequest,
    path: web::Path<(String, String, String)>,
    body: web::Json<Value>,
    state: web::Data<MockState>,
) -> HttpResponse {
    let (app_name, user_id, session_id) = path.into_inner();
    state.recorded.lock().unwrap().session_calls.push(SessionCall {
        app_name,
        user_id,
        session_id,
        body: body.into_inner(),
        authorization: authorization(&req),
    });
    HttpResponse::build(StatusCode::from_u16(state.config.session_status).unwrap())
        .body(state.config.session_body.clone())
}

async fn run_sse(
    req: HttpRequest,
    body: web::Json<Value>,
    state: web::Data<MockState>,
) -> HttpResponse {
    state.recorded.lock().unwrap().run_calls.push(RunCall {
        body: body.into_inner(),
        authorization: authorization(&req),
    });

    let status = StatusCode::from_u16(state.config.run_status).unwrap();
    if !status.is_success() {
        return HttpResponse::build(status).body(state.config.run_chunks.concat());
    }

    let delay = Duration::from_millis(state.config.chunk_delay_ms);
    let chunks = state.config.run_chunks.clone();
    let body = stream::iter(chunks).then(move |chunk| async move {
        if !delay.is_zero() {
            actix_web::rt::time::sleep(delay).await;
        }
        Ok::<_, actix_web::Error>(Bytes::from(chunk))
    });
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .streaming(body)
}
