//! Dispatch server CLI.
//!
//! Entry point for the dispatch binary. Provides subcommands for:
//! - `run` - start the server
//! - `migrate` - run database migrations
//! - `version` - print the version

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dispatch_server::app::App;
use dispatch_server::config::Settings;
use dispatch_server::ports::clock::SystemClock;
use dispatch_server::ports::store::Store;
use dispatch_server::store::{MemoryStore, PostgresStore};
use push_relay::{FcmClient, NoopSender, PushSender};

// ═══════════════════════════════════════════════════════════════════════════════
// CLI ARGUMENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Rideway dispatch server.
#[derive(Parser, Debug)]
#[command(name = "dispatch-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,

    /// Environment name selecting `config/{env}.toml`.
    #[arg(short, long, env = "DISPATCH_ENV", default_value = "development")]
    environment: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dispatch server.
    Run {
        /// Serve from an in-memory store (development only; state is lost
        /// on exit).
        #[arg(long)]
        memory_store: bool,
    },

    /// Run database migrations.
    Migrate,

    /// Show version information.
    Version,
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::load(&cli.environment)
        .with_context(|| format!("failed to load config for {}", cli.environment))?;
    init_logging(&settings);

    if let Err(errors) = settings.validate() {
        for error in &errors {
            warn!(%error, "Invalid configuration");
        }
        anyhow::bail!("configuration invalid: {}", errors.join("; "));
    }

    match cli.command {
        Commands::Run { memory_store } => run(settings, memory_store).await,
        Commands::Migrate => migrate(settings).await,
        Commands::Version => {
            println!("dispatch-server {}", dispatch_server::VERSION);
            Ok(())
        }
    }
}

async fn run(settings: Settings, memory_store: bool) -> Result<()> {
    info!(
        version = dispatch_server::VERSION,
        memory_store, "Starting dispatch server"
    );

    let store: Arc<dyn Store> = if memory_store {
        warn!("Serving from the in-memory store; all state dies with the process");
        Arc::new(MemoryStore::new())
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(settings.database.max_connections)
            .min_connections(settings.database.min_connections)
            .acquire_timeout(settings.database.connect_timeout())
            .connect(&settings.database.url)
            .await
            .context("failed to connect to the database")?;
        let store = PostgresStore::new(pool);
        store
            .run_migrations()
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        Arc::new(store)
    };

    // Missing push credentials degrade push to a no-op; the realtime
    // channel remains the primary delivery.
    let push: Arc<dyn PushSender> = match settings.push.server_key.as_deref() {
        Some(key) if !key.is_empty() => Arc::new(
            FcmClient::new(settings.push.endpoint.clone(), key).with_timeout(settings.push.timeout()),
        ),
        _ => {
            info!("No push credential configured; push delivery disabled");
            Arc::new(NoopSender)
        }
    };

    let bind = format!("{}:{}", settings.api.host, settings.api.port);
    let app = App::build(settings, store, push, Arc::new(SystemClock::new()));
    app.start().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    let cancel = CancellationToken::new();
    app.spawn_background(&cancel);

    let router = dispatch_server::api::router(app.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(%bind, "Listening");

    let shutdown_cancel = cancel.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            shutdown_cancel.cancel();
        })
        .await
        .context("server error")?;

    app.shutdown().await;
    Ok(())
}

async fn migrate(settings: Settings) -> Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&settings.database.url)
        .await
        .context("failed to connect to the database")?;
    PostgresStore::new(pool)
        .run_migrations()
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    info!("Migrations applied");
    Ok(())
}

fn init_logging(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.logging.level.clone()));
    if settings.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
