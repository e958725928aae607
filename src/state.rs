use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::{self, PgPool},
    error::{AppError, AppResult},
    storage::{ObjectStorage, S3Storage},
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        storage: Arc<dyn ObjectStorage>,
        jwt: JwtService,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            storage,
            jwt,
        }
    }

    /// Production bootstrap: pool, S3-backed storage, and JWT service all
    /// derived from the environment configuration. Tests use [`Self::new`]
    /// with an in-memory storage instead.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        let storage: Arc<dyn ObjectStorage> = Arc::new(S3Storage::from_config(&config).await?);
        let jwt = JwtService::from_config(&config)?;
        Ok(Self::new(pool, config, storage, jwt))
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }
}
