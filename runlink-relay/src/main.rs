use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use runlink_relay::state::{AllowAll, AppState, CredentialProvider, StaticToken};

#[derive(Parser)]
#[command(name = "runlink-relay", about = "Real-time relay for runlink conversations")]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 3200)]
    port: u16,

    /// Shared join token; omit to accept any non-empty token (dev only)
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let credentials: Box<dyn CredentialProvider> = match cli.token {
        Some(token) => Box::new(StaticToken::new(&token)),
        None => {
            info!("no join token configured, accepting any non-empty token");
            Box::new(AllowAll)
        }
    };

    let state = AppState::new(credentials);
    let app = runlink_relay::build_router(state);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    info!("runlink-relay listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
