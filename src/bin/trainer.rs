use shoprec::{init_tracing, AppState, Config};
use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Run a single training pass and exit instead of looping.
    #[arg(long)]
    once: bool,

    /// Retrain even when the current model is still fresh.
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing with specified log level
    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing().await;

    info!("Starting Shoprec trainer");

    // Load configuration
    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };

    let check_interval = config.training.check_interval_secs;
    let state = AppState::new(config).await?;

    if args.once {
        run_training_pass(&state, args.force).await;
        return Ok(());
    }

    info!("Trainer loop running, checking every {}s", check_interval);
    loop {
        run_training_pass(&state, args.force).await;
        tokio::time::sleep(tokio::time::Duration::from_secs(check_interval)).await;
    }
}

async fn run_training_pass(state: &AppState, force: bool) {
    match state.training_service.train_if_needed(force).await {
        Ok(Some(report)) => {
            info!(
                "Training finished: version={} users={} products={} interactions={} elapsed_ms={}",
                report.version,
                report.user_count,
                report.product_count,
                report.interaction_count,
                report.elapsed_ms
            );
        }
        Ok(None) => {
            info!("Model is still fresh, skipping retrain");
        }
        Err(e) => {
            error!("Training pass failed: {}", e);
        }
    }
}
