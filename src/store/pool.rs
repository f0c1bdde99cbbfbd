use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Connect to Postgres and bring the webhook schema up to date.
#[tracing::instrument(skip(url), err)]
pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(url)
        .await?;
    tracing::info!(max_connections, "connected to postgres");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("webhook schema migrated");

    Ok(pool)
}
