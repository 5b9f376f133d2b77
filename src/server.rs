use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::proxy_state::ProxyState;
use actix_web::{HttpRequest, HttpResponse, HttpServer, get, post, web};
use std::io::Write;

#[get("/health")]
pub async fn health(_req: HttpRequest, _: web::Data<ProxyState>) -> HttpResponse {
    HttpResponse::Ok().body("Ok")
}

#[post("/api/stream")]
pub async fn stream(
    req: HttpRequest,
    body: web::Bytes,
    app_state: web::Data<ProxyState>,
) -> Result<HttpResponse, ProxyError> {
    app_state.handle(&req, &body).await.inspect_err(|e| {
        log::error!("[Proxy] request failed: {}", e);
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(stream);
}

pub fn init_logging(level: log::LevelFilter) {
    // RUST_LOG, when set, overrides the configured level
    let _ = env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .parse_default_env()
        .try_init();
}

pub async fn startup(config: ProxyConfig, proxy_state: ProxyState) -> std::io::Result<()> {
    let app_state = web::Data::new(proxy_state);

    log::info!(
        "Starting proxy at {}:{} -> {} (app {})",
        config.host,
        config.port,
        config.upstream_url,
        config.app_name
    );

    HttpServer::new(move || {
        actix_web::App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(app_state.clone())
            .configure(configure)
    })
    .bind((config.host, config.port))?
    .run()
    .await?;

    std::io::Result::Ok(())
}
