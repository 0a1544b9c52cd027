//! SQLite connection factory and the module migration runner.

use std::str::FromStr;

use anyhow::Context;
use shelf_kernel::settings::DatabaseSettings;
use shelf_kernel::{Migration, ModuleRegistry};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

const LEDGER_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_migrations (
        module     TEXT NOT NULL,
        id         TEXT NOT NULL,
        applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (module, id)
    )
"#;

/// Open a pool for the configured database.
///
/// In-memory databases live only as long as their connection, so they are
/// pinned to one connection that never idles out.
pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&settings.url)
        .with_context(|| format!("invalid database url '{}'", settings.url))?
        .foreign_keys(true);

    let in_memory = settings.url.contains(":memory:") || settings.url.contains("mode=memory");
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(settings.max_connections.max(1))
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .with_context(|| format!("failed to connect to '{}'", settings.url))?;

    tracing::info!(target: "shelf-db", url = %settings.url, in_memory, "database connected");
    Ok(pool)
}

/// Apply every migration contributed by the registry's modules.
pub async fn migrate(pool: &SqlitePool, registry: &ModuleRegistry) -> anyhow::Result<usize> {
    apply_migrations(pool, &registry.collect_migrations()).await
}

/// Apply pending migrations in order, each in its own transaction.
/// Returns how many were applied by this call.
pub async fn apply_migrations(
    pool: &SqlitePool,
    migrations: &[(String, Migration)],
) -> anyhow::Result<usize> {
    sqlx::raw_sql(LEDGER_DDL)
        .execute(pool)
        .await
        .context("failed to create migration ledger")?;

    let mut applied = 0;
    for (module, migration) in migrations {
        let already: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM schema_migrations WHERE module = ? AND id = ?")
                .bind(module)
                .bind(migration.id)
                .fetch_optional(pool)
                .await
                .context("failed to read migration ledger")?;

        if already.is_some() {
            tracing::debug!(target: "shelf-db", %module, id = migration.id, "migration already applied");
            continue;
        }

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.up)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("migration '{}/{}' failed", module, migration.id))?;
        sqlx::query("INSERT INTO schema_migrations (module, id) VALUES (?, ?)")
            .bind(module)
            .bind(migration.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(target: "shelf-db", %module, id = migration.id, "migration applied");
        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> DatabaseSettings {
        DatabaseSettings {
            url: "sqlite::memory:".to_string(),
            max_connections: 4,
        }
    }

    fn migrations() -> Vec<(String, Migration)> {
        vec![
            (
                "books".to_string(),
                Migration {
                    id: "001_init",
                    up: "CREATE TABLE books (id INTEGER PRIMARY KEY, title TEXT NOT NULL);",
                },
            ),
            (
                "books".to_string(),
                Migration {
                    id: "002_seed",
                    up: "INSERT INTO books (title) VALUES ('Dune'); INSERT INTO books (title) VALUES ('Emma');",
                },
            ),
        ]
    }

    #[tokio::test]
    async fn migrations_apply_once() {
        let pool = connect(&memory()).await.unwrap();

        assert_eq!(apply_migrations(&pool, &migrations()).await.unwrap(), 2);
        assert_eq!(apply_migrations(&pool, &migrations()).await.unwrap(), 0);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn failed_migration_is_not_recorded() {
        let pool = connect(&memory()).await.unwrap();
        let broken = vec![(
            "books".to_string(),
            Migration {
                id: "001_broken",
                up: "CREATE TABLE broken (id INTEGER); NOT VALID SQL;",
            },
        )];

        assert!(apply_migrations(&pool, &broken).await.is_err());

        let recorded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(recorded, 0);
    }

    #[tokio::test]
    async fn rejects_malformed_url() {
        let settings = DatabaseSettings {
            url: "postgres://not-sqlite".to_string(),
            max_connections: 1,
        };
        assert!(connect(&settings).await.is_err());
    }
}
