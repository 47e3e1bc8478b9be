use anyhow::Result;
use std::sync::Arc;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = kvgate::config::Cli::parse();
    let cmd = cli.command.clone().unwrap_or(kvgate::config::Command::Serve);

    match cmd {
        kvgate::config::Command::Serve => run_server(cli.config).await,
        kvgate::config::Command::Console => kvgate::console::run(&cli.config.server).await,
    }
}

async fn run_server(config: kvgate::config::Config) -> Result<()> {
    let users = kvgate::auth::UserTable::new(&config.users);
    if users.is_empty() {
        anyhow::bail!("at least one --user NAME:PASSWORD is required");
    }
    let dispatcher = kvgate::dispatcher::Dispatcher::try_from_config(&config)?;
    let user_count = users.len();

    let app = kvgate::http::build_router(kvgate::http::AppState {
        dispatcher: Arc::new(dispatcher),
        users: Arc::new(users),
    })
    .layer(TraceLayer::new_for_http());

    info!(
        bind = %config.bind,
        replicas = config.replicas.len(),
        voters = ?config.voters,
        users = user_count,
        sessions = config.pool_size(),
        "starting kvgate"
    );
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).compact().init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
