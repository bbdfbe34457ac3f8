use shoprec::{init_tracing, AppState, Config, DomainEvent};
use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing with specified log level
    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing().await;

    info!("Starting Shoprec event worker");

    // Load configuration
    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };

    let state = AppState::new(config).await?;

    let (tx, mut rx) = mpsc::channel::<DomainEvent>(1000);

    let consumer = state.event_consumer.clone();
    tokio::spawn(async move {
        if let Err(e) = consumer.run(tx).await {
            error!("Event consumer error: {}", e);
        }
    });

    while let Some(event) = rx.recv().await {
        state.recommendation_service.handle_event(&event).await;
    }

    info!("Event stream closed, shutting down");
    Ok(())
}
