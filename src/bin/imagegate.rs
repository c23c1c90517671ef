use std::path::PathBuf;

use clap::Parser;
use imagegate::gateway::{GatewayHttpState, init_tracing, router};
use imagegate::{Dispatcher, Env, ImagegateConfig};

#[derive(Debug, Parser)]
#[command(name = "imagegate")]
#[command(version, about = "HTTP gateway for hosted image generation APIs", long_about = None)]
struct Cli {
    /// TOML config file (listen address, poll settings, per-provider overrides).
    #[arg(long, env = "IMAGEGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address, e.g. 127.0.0.1:3000. Overrides the config file and PORT.
    #[arg(long, alias = "addr")]
    listen: Option<String>,

    /// Dotenv file with provider credentials. Defaults to ./.env when present.
    #[arg(long)]
    dotenv: Option<PathBuf>,

    #[arg(long)]
    poll_interval_ms: Option<u64>,

    #[arg(long)]
    poll_max_attempts: Option<u32>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

fn load_env(path: Option<PathBuf>) -> Result<Env, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Env::from_dotenv_file(&path)?),
        None => {
            let default = PathBuf::from(".env");
            if default.is_file() {
                Ok(Env::from_dotenv_file(&default)?)
            } else {
                Ok(Env::default())
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    let env = load_env(cli.dotenv)?;
    let mut config = match cli.config.as_deref() {
        Some(path) => ImagegateConfig::load(path)?,
        None => ImagegateConfig::default(),
    };
    if let Some(interval_ms) = cli.poll_interval_ms {
        config.poll.interval_ms = interval_ms;
    }
    if let Some(max_attempts) = cli.poll_max_attempts {
        config.poll.max_attempts = max_attempts;
    }
    let listen = cli
        .listen
        .unwrap_or_else(|| config.resolve_listen(&env));

    let dispatcher = Dispatcher::from_config(&config, &env);
    let app = router(GatewayHttpState::new(dispatcher));
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(%listen, poll_interval_ms = config.poll.interval_ms, poll_max_attempts = config.poll.max_attempts, "imagegate listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
