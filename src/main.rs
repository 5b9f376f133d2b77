use std::io::{BufRead, Write};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use workmatch_proxy::ChatProxy;
use workmatch_proxy::client::ChatSession;
use workmatch_proxy::config::{AuthMode, ClientConfig, DEFAULT_METADATA_URL, ProxyConfig};
use workmatch_proxy::server::init_logging;

#[derive(Parser, Debug)]
#[command(name = "workmatch-proxy")]
#[command(about = "Streaming chat proxy for the WorkMatch agent service")]
struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info", env = "LOG_LEVEL")]
    log_level: log::LevelFilter,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve POST /api/stream
    Serve(ServeArgs),
    /// Chat with a running proxy from the terminal
    Chat(ChatArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AuthKind {
    None,
    Static,
    Metadata,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1", env = "PROXY_HOST")]
    host: String,

    #[arg(long, default_value_t = 3000, env = "PROXY_PORT")]
    port: u16,

    /// Base URL of the upstream agent service
    #[arg(long, env = "UPSTREAM_URL")]
    upstream_url: String,

    #[arg(long, default_value = "workmatch", env = "UPSTREAM_APP_NAME")]
    app_name: String,

    /// How to obtain the bearer identity token for upstream calls
    #[arg(long, value_enum, default_value = "none", env = "UPSTREAM_AUTH")]
    auth: AuthKind,

    /// Identity token used with --auth static
    #[arg(long, env = "UPSTREAM_ID_TOKEN", hide_env_values = true)]
    id_token: Option<String>,

    #[arg(long, default_value = DEFAULT_METADATA_URL, env = "METADATA_IDENTITY_URL")]
    metadata_url: String,

    /// Upstream request timeout in seconds
    #[arg(long, default_value_t = 600)]
    timeout: u64,
}

#[derive(Args, Debug)]
struct ChatArgs {
    #[arg(long, default_value = "http://127.0.0.1:3000", env = "PROXY_URL")]
    proxy_url: String,

    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    /// Backoff step in milliseconds; attempt n waits n * step
    #[arg(long, default_value_t = 500)]
    retry_step_ms: u64,
}

impl ServeArgs {
    fn into_config(self, log_level: log::LevelFilter) -> ProxyConfig {
        let auth = match self.auth {
            AuthKind::None => AuthMode::None,
            AuthKind::Static => AuthMode::Static(self.id_token.unwrap_or_default()),
            AuthKind::Metadata => AuthMode::Metadata {
                metadata_url: self.metadata_url,
            },
        };
        ProxyConfig {
            host: self.host,
            port: self.port,
            upstream_url: self.upstream_url.trim_end_matches('/').to_string(),
            app_name: self.app_name,
            auth,
            timeout: self.timeout,
            log_level,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            let config = args.into_config(cli.log_level);
            config.validate()?;
            ChatProxy::new(config).start()
        }
        Command::Chat(args) => {
            init_logging(cli.log_level);
            let config = ClientConfig {
                proxy_url: args.proxy_url.trim_end_matches('/').to_string(),
                max_attempts: args.max_attempts,
                retry_step: Duration::from_millis(args.retry_step_ms),
            };
            config.validate()?;
            tokio::runtime::Runtime::new()?.block_on(chat(config))
        }
    }
}

async fn chat(config: ClientConfig) -> anyhow::Result<()> {
    let mut session = ChatSession::connect(&config)?;
    let stdin = std::io::stdin();
    print!("> ");
    std::io::stdout().flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let outcome = session
            .submit_with(&line, |delta| {
                print!("{}", delta);
                let _ = std::io::stdout().flush();
            })
            .await;
        if let Some(outcome) = outcome {
            println!();
            if !outcome.completed {
                log::warn!("No complete reply after {} attempts", outcome.attempts);
            }
        }
        print!("> ");
        std::io::stdout().flush()?;
    }
    Ok(())
}
