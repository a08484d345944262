//! PostgreSQL pool factory and migration runner.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::{PgPool, PgPoolOptions};

use libris_kernel::{settings::DatabaseSettings, Migration};

/// Key for `pg_advisory_xact_lock`, so concurrent instances migrate one at a time.
const MIGRATION_LOCK_KEY: i64 = 0x6c69_6272_6973;

const CREATE_LEDGER: &str = r#"
    CREATE TABLE IF NOT EXISTS libris_migrations (
        module     TEXT        NOT NULL,
        id         TEXT        NOT NULL,
        applied_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (module, id)
    )
"#;

/// Fixed-delay retry schedule for startup operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        Self {
            attempts: settings.connect_retries.max(1),
            delay: Duration::from_millis(settings.connect_retry_delay_ms),
        }
    }
}

/// Run `operation` until it succeeds or `policy.attempts` is exhausted,
/// sleeping `policy.delay` between attempts. Returns the last error.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, what: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                tracing::info!(attempt, "{} succeeded", what);
                return Ok(value);
            }
            Err(err) if attempt < attempts => {
                tracing::warn!(
                    attempt,
                    attempts,
                    delay_ms = policy.delay.as_millis() as u64,
                    error = %err,
                    "{} failed, retrying",
                    what
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(attempts, error = %err, "{} failed, giving up", what);
                return Err(err);
            }
        }
    }
}

/// Connect to PostgreSQL, retrying per the configured policy
pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<PgPool> {
    tracing::info!(url = %settings.redacted_url(), "connecting to database");

    let options = PgPoolOptions::new().max_connections(settings.max_connections);
    let policy = RetryPolicy::from_settings(settings);

    retry(policy, "database connection", || {
        options.clone().connect(&settings.url)
    })
    .await
    .with_context(|| {
        format!(
            "database unreachable after {} attempts at {}",
            policy.attempts,
            settings.redacted_url()
        )
    })
}

/// Apply every migration not yet recorded in `libris_migrations`.
/// Returns the number of migrations applied by this call.
pub async fn migrate(pool: &PgPool, migrations: &[(String, Migration)]) -> anyhow::Result<usize> {
    sqlx::raw_sql(CREATE_LEDGER)
        .execute(pool)
        .await
        .context("failed to create migration ledger")?;

    let mut applied = 0;
    for (module, migration) in migrations {
        let mut tx = pool.begin().await.context("failed to open migration transaction")?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .context("failed to acquire migration lock")?;

        let already: Option<(String,)> =
            sqlx::query_as("SELECT id FROM libris_migrations WHERE module = $1 AND id = $2")
                .bind(module)
                .bind(migration.id)
                .fetch_optional(&mut *tx)
                .await
                .context("failed to read migration ledger")?;

        if already.is_some() {
            tracing::debug!(module = %module, id = migration.id, "migration already applied");
            continue;
        }

        sqlx::raw_sql(migration.up)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("migration {}/{} failed", module, migration.id))?;

        sqlx::query("INSERT INTO libris_migrations (module, id) VALUES ($1, $2)")
            .bind(module)
            .bind(migration.id)
            .execute(&mut *tx)
            .await
            .context("failed to record migration")?;

        tx.commit()
            .await
            .with_context(|| format!("failed to commit migration {}/{}", module, migration.id))?;

        tracing::info!(module = %module, id = migration.id, "migration applied");
        applied += 1;
    }

    Ok(applied)
}
