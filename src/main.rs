use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use docflow::{config::AppConfig, db, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        s3_bucket = %config.s3_bucket,
        "loaded backend configuration"
    );

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let state = AppState::from_config(config).await?;
    run_migrations(&state).await?;

    let router = routes::create_router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}

async fn run_migrations(state: &AppState) -> anyhow::Result<()> {
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow::anyhow!("failed to acquire connection: {err}"))?;
        db::run_pending_migrations(&mut conn)
    })
    .await?
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
