pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod io_struct;
pub mod proxy_state;
pub mod server;
pub mod session;
pub mod sse;

use config::ProxyConfig;
use proxy_state::ProxyState;
use server::{init_logging, startup};
use tokio::signal;

pub struct ChatProxy {
    config: ProxyConfig,
}

impl ChatProxy {
    pub fn new(config: ProxyConfig) -> Self {
        ChatProxy { config }
    }

    /// Runs the proxy until it fails or Ctrl+C is received.
    pub fn start(&self) -> anyhow::Result<()> {
        init_logging(self.config.log_level);
        let proxy_state = ProxyState::new(self.config.clone())
            .map_err(|e| anyhow::anyhow!("Failed to build proxy: {}", e))?;

        actix_web::rt::System::new().block_on(async move {
            tokio::select! {
                res = startup(self.config.clone(), proxy_state) => {
                    res.map_err(anyhow::Error::from)
                }
                _ = signal::ctrl_c() => {
                    log::info!("Received Ctrl+C, shutting down");
                    Ok(())
                }
            }
        })
    }
}
