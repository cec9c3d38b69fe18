use db_pool::{create_pool, DbConfig};
use sqlx::migrate::Migrator;
use sqlx::{Pool, Postgres};

use crate::error::AppResult;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub const SERVICE_NAME: &str = "match-messaging-service";

pub async fn init_pool(database_url: &str) -> AppResult<Pool<Postgres>> {
    let mut cfg = match DbConfig::from_env(SERVICE_NAME) {
        Ok(cfg) => cfg,
        Err(db_pool::DbPoolError::MissingVar(_)) => DbConfig {
            service_name: SERVICE_NAME.to_string(),
            ..DbConfig::default()
        },
        Err(e) => return Err(e.into()),
    };
    if cfg.database_url.is_empty() {
        cfg.database_url = database_url.to_string();
    }
    cfg.log_config();
    Ok(create_pool(cfg).await?)
}

pub async fn run_migrations(pool: &Pool<Postgres>) -> AppResult<()> {
    MIGRATOR.run(pool).await?;
    tracing::info!("database migrations applied");
    Ok(())
}
