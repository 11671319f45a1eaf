use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use alchemax::auth::revocation;
use alchemax::config::{Cli, Command, Config};
use alchemax::db;
use alchemax::routes;
use alchemax::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let db_path = config
        .db_path()
        .context("No database path configured")?;
    let pool = db::create_pool(db_path)?;
    db::run_migrations(&pool)?;

    if let Some(Command::PromoteAdmin { username }) = &cli.command {
        return promote_admin(&pool, username);
    }

    let secret = config.secret()?.to_string();
    let state = AppState::new(pool, config.clone(), &secret)?;

    let sweep_every = Duration::from_secs(config.auth.revocation_sweep_secs.max(1));
    revocation::spawn_sweep(state.revocations.clone(), sweep_every);

    let app = routes::router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn promote_admin(pool: &alchemax::state::DbPool, username: &str) -> anyhow::Result<()> {
    let conn = pool.get()?;
    let user = db::users::find_by_username(&conn, username)?
        .with_context(|| format!("No account named '{}'", username))?;
    db::users::set_admin(&conn, &user.id, true)?;
    tracing::info!("Granted admin to {}", username);
    Ok(())
}
