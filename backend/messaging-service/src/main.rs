use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use messaging_service::{
    config::{Config, StorageBackend},
    db, logging,
    repository::{
        ChatStore, ConversationDirectory, InMemoryChatStore, InMemoryDirectory, InMemoryProfiles,
        PgChatStore, PgConversationDirectory, PgProfileLookup, ProfileLookup,
    },
    routes,
    services::MessagingService,
    state::AppState,
};
use tracing_actix_web::TracingLogger;

type Backends = (
    Arc<dyn ConversationDirectory>,
    Arc<dyn ChatStore>,
    Arc<dyn ProfileLookup>,
);

async fn build_backends(config: &Config) -> Result<Backends> {
    match config.storage {
        StorageBackend::Postgres => {
            let pool = db::init_pool(&config.database_url)
                .await
                .context("Failed to initialize database pool")?;
            if config.run_migrations {
                db::run_migrations(&pool)
                    .await
                    .context("Failed to run database migrations")?;
            }
            let directory: Arc<dyn ConversationDirectory> =
                Arc::new(PgConversationDirectory::new(pool.clone(), db::SERVICE_NAME));
            let store: Arc<dyn ChatStore> =
                Arc::new(PgChatStore::new(pool.clone(), db::SERVICE_NAME));
            let profiles: Arc<dyn ProfileLookup> =
                Arc::new(PgProfileLookup::new(pool, db::SERVICE_NAME));
            Ok((directory, store, profiles))
        }
        StorageBackend::Memory => {
            tracing::warn!(
                relationships = config.memory_relationships.len(),
                "using in-memory storage; data is lost on restart"
            );
            let directory: Arc<dyn ConversationDirectory> = Arc::new(
                InMemoryDirectory::with_relationships(config.memory_relationships.clone()),
            );
            let store: Arc<dyn ChatStore> = Arc::new(InMemoryChatStore::new());
            let profiles: Arc<dyn ProfileLookup> = Arc::new(InMemoryProfiles::new());
            Ok((directory, store, profiles))
        }
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    logging::init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        storage = ?config.storage,
        port = config.port,
        "starting match-messaging-service"
    );

    let (directory, store, profiles) = build_backends(&config).await?;
    let messaging = MessagingService::new(directory, store, profiles, config.chat);

    let bind_addr = config.bind_addr();
    let state = AppState::new(messaging, config);

    tracing::info!(%bind_addr, "HTTP server listening");
    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {bind_addr}"))?
    .run()
    .await
    .context("HTTP server terminated with an error")?;

    tracing::info!("match-messaging-service stopped");
    Ok(())
}
