//! # Commerce Dashboard
//!
//! Binary entry point: serve the dashboard API, or render the report once.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commerce_analytics::AnalyticsEngine;
use commerce_dashboard::{build_router, build_schema, ApiContext, Config};

#[derive(Parser, Debug)]
#[command(name = "commerce-dashboard")]
#[command(about = "E-commerce delivery analytics dashboard", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the GraphQL API and report routes (default)
    Serve,
    /// Load the dataset, print the report to stdout and exit
    Render {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Markdown)]
        format: Format,

        /// Dataset directory (overrides DATA_DIR)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            init_tracing(&config, true);
            serve(config).await
        }
        Command::Render { format, data_dir } => {
            init_tracing(&config, false);
            render(config, format, data_dir)
        }
    }
}

/// Logs go to stderr so rendered reports on stdout stay clean.
fn init_tracing(config: &Config, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.clone().into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        version = commerce_dashboard::VERSION,
        data_dir = %config.data_dir.display(),
        null_keys = %config.null_key_policy,
        "Starting Commerce Dashboard API"
    );

    let ctx = ApiContext::new(&config);
    let schema = build_schema(ctx.clone(), config.max_query_depth, config.max_query_complexity);

    tracing::info!(
        playground = config.enable_playground,
        max_depth = config.max_query_depth,
        max_complexity = config.max_query_complexity,
        "GraphQL schema built"
    );

    let app = build_router(schema, ctx, &config);

    let addr = config.server_addr;
    tracing::info!(%addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("GraphQL endpoint available at http://{}/graphql", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

fn render(config: Config, format: Format, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let dir = data_dir.unwrap_or_else(|| config.data_dir.clone());
    let engine = AnalyticsEngine::from_csv_dir(&dir, &config.files)
        .with_context(|| format!("loading dataset from {}", dir.display()))?;

    let params = config.report_params();
    let output = match format {
        Format::Markdown => engine.generate_report_markdown(params)?,
        Format::Json => engine.generate_report_json(params)?,
    };
    println!("{output}");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
