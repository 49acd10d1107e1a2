use anyhow::Context;
use identity_bridge::config::Settings;
use identity_bridge::db::{
    PgCodeRepository, PgReconciliationJournal, PgUserDirectory, ReconciliationJournal,
    UserDirectory,
};
use identity_bridge::http;
use identity_bridge::provider::{HttpIdentityProvider, IdentityProvider};
use identity_bridge::services::{
    spawn_reconciliation_worker, CodeStore, EmailDispatch, IdentityBridge, ReconcileConfig,
    SessionTokenManager, SmtpEmailDispatch,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let settings = Settings::load().context("Failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .min_connections(settings.database.min_connections)
        .acquire_timeout(Duration::from_secs(settings.database.acquire_timeout))
        .connect(&settings.database.url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database ready");

    let directory: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(pool.clone()));
    let journal: Arc<dyn ReconciliationJournal> =
        Arc::new(PgReconciliationJournal::new(pool.clone()));
    let provider: Arc<dyn IdentityProvider> =
        Arc::new(HttpIdentityProvider::new(settings.provider.clone())?);
    let email: Arc<dyn EmailDispatch> = Arc::new(SmtpEmailDispatch::new(&settings.email)?);

    let codes = CodeStore::new(
        Arc::new(PgCodeRepository::new(pool.clone())),
        settings.codes.clone(),
    );
    let sessions = SessionTokenManager::new(&settings.session);

    let bridge = Arc::new(IdentityBridge::new(
        directory,
        Arc::clone(&provider),
        Arc::clone(&journal),
        email,
        codes,
        sessions,
        &settings.consent,
    ));

    let worker = spawn_reconciliation_worker(journal, provider, ReconcileConfig::default());

    let result = http::serve(bridge, &settings.server.host, settings.server.port).await;

    worker.abort();
    result
}
