use std::sync::Arc;

use clap::Parser;
use precis_core::history::Validation;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use precis_server::http::{start_http_server, HttpState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "precis.toml")]
    config: String,

    /// Validate configuration and the history file, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match precis_server::load_config(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    // The history file must be valid before the first request arrives
    let (gateway, validation) = match precis_server::start_gateway(&config).await {
        Ok(started) => started,
        Err(e) => {
            eprintln!("Failed to initialise summarization gateway: {}", e);
            std::process::exit(1);
        }
    };

    if args.check {
        let path = gateway.history().path().display().to_string();
        match validation {
            Validation::Intact => println!("✅ History file valid: {}", path),
            Validation::Created => println!("✅ History file created: {}", path),
            Validation::Reset { quarantined } => {
                println!("⚠️ History file was corrupted and has been reset: {}", path);
                if let Some(q) = quarantined {
                    println!("   previous contents kept at {}", q.display());
                }
            }
        }
        println!("✅ Gemini model: {}", config.gemini.model);
        println!("✅ Listen address: {}", config.listen_addr());
        println!("✅ Precis configuration check passed");
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let state = Arc::new(HttpState { gateway, config });
    start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
