mod artifacts;
mod routes;
mod view;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "A web form that scores the sentiment of a text.")]
struct Args {
    /// The address to listen on
    #[arg(long, env = "SENTI_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// The port to listen on
    #[arg(long, env = "SENTI_PORT", default_value = "4000")]
    port: u16,

    /// The classifier model file
    #[arg(long, env = "SENTI_MODEL", default_value = "models/classifier.model.zst")]
    model: PathBuf,

    /// The vocabulary file of the classifier
    #[arg(long, env = "SENTI_VOCAB", default_value = "models/tokenizer.vocab.zst")]
    vocab: PathBuf,

    /// A lexicon in the VADER format replacing the built-in one
    #[arg(long, env = "SENTI_LEXICON")]
    lexicon: Option<PathBuf>,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for the shutdown signal");
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("senti_server=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();

    let analyzer = artifacts::load_analyzer(&args.model, &args.vocab, args.lexicon.as_deref())
        .inspect_err(|e| tracing::error!(error = %e, "failed to load artifacts"))?;
    let app = routes::create_router(routes::AppState::new(analyzer)?);

    let addr = SocketAddr::new(args.host, args.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
