use std::sync::Arc;

use charforge_core::store::{open_stores, seed_default_worldviews};
use charforge_core::{
    notifier_from_config, CharforgeConfig, CharforgeError, GeminiGenerationClient, Notifier,
};
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use charforge_server::router::AppState;
use charforge_server::server;
use charforge_server::subsystems::watchdog::{InactivityWatchdog, WatchdogSettings};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "charforge.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is for local runs; deployments set real env vars
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match CharforgeConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the config level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let (stores, pool) = match open_stores(&config.storage, &config.database).await {
        Ok(opened) => opened,
        Err(e) => {
            eprintln!("Failed to open storage: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match &pool {
            Some(pool) => match charforge_core::db::health_check(pool).await {
                Ok(v) => println!("✅ PostgreSQL connected: {}", v),
                Err(e) => {
                    println!("❌ PostgreSQL connection failed: {}", e);
                    std::process::exit(1);
                }
            },
            None => println!("✅ In-memory storage"),
        }
        match stores.worldviews.list().await {
            Ok(names) => println!("✅ {} worldview presets", names.len()),
            Err(e) => {
                println!("❌ Worldview store failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ Charforge health check passed");
        return Ok(());
    }

    seed_default_worldviews(stores.worldviews.as_ref()).await?;

    let (generator, notifier) = match build_clients(&config) {
        Ok(clients) => clients,
        Err(e) => {
            eprintln!("Failed to create outbound clients: {}", e);
            std::process::exit(1);
        }
    };
    let state = Arc::new(AppState::new(
        config.clone(),
        stores,
        pool,
        Arc::new(generator),
        notifier.clone(),
    ));

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

    let watchdog = InactivityWatchdog::new(
        state.registry().clone(),
        notifier,
        WatchdogSettings::from(&config.watchdog),
    );
    tokio::spawn(watchdog.run(tx.subscribe()));

    if config.http.enabled {
        let http_state = state.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = charforge_server::http::start_http_server(http_state, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = config.service.socket_path.clone();
    server::run_unix_server(&socket_path, state, tx.subscribe()).await?;

    Ok(())
}

fn build_clients(
    config: &CharforgeConfig,
) -> Result<(GeminiGenerationClient, Arc<dyn Notifier>), CharforgeError> {
    let generator = GeminiGenerationClient::from_config(&config.generation)?;
    let notifier = notifier_from_config(&config.gateway)?;
    tracing::info!(model = %config.generation.model, "Generation client ready");
    Ok((generator, notifier))
}
