//! Libris: a library book inventory and lending service.
//!
//! The application wires the `books` module onto the shared kernel, HTTP and
//! database crates. [`run`] is the full server lifecycle; [`migrate`] only
//! brings the schema up to date.

pub mod modules;

use std::sync::Arc;

use anyhow::Context;
use libris_kernel::{settings::Settings, InitCtx, ModuleRegistry};
use sqlx::PgPool;

use modules::books::store::{PgBookStore, SharedStore};

/// Build the registry with every module backed by `store`
pub fn registry(store: SharedStore) -> anyhow::Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, store)?;
    Ok(registry)
}

async fn connect(settings: &Settings) -> anyhow::Result<(PgPool, ModuleRegistry)> {
    let pool = libris_db::connect(&settings.database).await?;
    let store: SharedStore = Arc::new(PgBookStore::new(pool.clone()));
    Ok((pool, registry(store)?))
}

/// Connect, migrate, serve until shutdown, then stop modules.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    tracing::info!(
        env = settings.environment.as_str(),
        db = %settings.database.redacted_url(),
        "libris bootstrap starting"
    );

    let (pool, registry) = connect(&settings).await?;
    let ctx = InitCtx {
        settings: &settings,
    };

    registry.init_all(&ctx).await?;
    let applied = libris_db::migrate(&pool, &registry.collect_migrations())
        .await
        .context("failed to bring schema up to date")?;
    tracing::info!(applied, "schema ready");
    registry.start_all(&ctx).await?;

    tracing::info!("libris bootstrap complete");
    let served = libris_http::start_server(&registry, &settings).await;

    registry.stop_all().await?;
    pool.close().await;
    served
}

/// Apply pending migrations and exit.
pub async fn migrate(settings: Settings) -> anyhow::Result<usize> {
    let (pool, registry) = connect(&settings).await?;
    let applied = libris_db::migrate(&pool, &registry.collect_migrations()).await?;
    pool.close().await;
    Ok(applied)
}
