//! Shelf application library
//!
//! Wires the project modules onto the Shelf kernel and drives the service
//! lifecycle: connect, init, migrate, start, serve, stop.

pub mod modules;

use anyhow::Context;
use shelf_events::EventBus;
use shelf_kernel::settings::Settings;
use shelf_kernel::{InitCtx, ModuleRegistry};

pub use modules::register_all;

/// Registry holding every project module
pub fn registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    register_all(&mut registry);
    registry
}

/// Run the HTTP service until a shutdown signal arrives
pub async fn serve(settings: &Settings) -> anyhow::Result<()> {
    let pool = shelf_db::connect(&settings.database).await?;
    let events = EventBus::new(settings.events.enabled, settings.events.capacity);
    let registry = registry();

    let ctx = InitCtx {
        settings,
        db: &pool,
        events: &events,
    };

    registry.init_modules(&ctx).await?;
    let applied = shelf_db::migrate(&pool, &registry)
        .await
        .context("failed to apply migrations")?;
    tracing::info!(applied, "migrations up to date");
    registry.start_modules(&ctx).await?;

    let served = shelf_http::start_server(&registry, settings).await;

    if let Err(err) = registry.stop_modules().await {
        tracing::error!(error = ?err, "module shutdown failed");
    }
    pool.close().await;
    tracing::info!("shelf stopped");

    served
}

/// Apply pending migrations without starting the server
pub async fn migrate(settings: &Settings) -> anyhow::Result<usize> {
    let pool = shelf_db::connect(&settings.database).await?;
    let applied = shelf_db::migrate(&pool, &registry())
        .await
        .context("failed to apply migrations")?;
    pool.close().await;
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_kernel::settings::DatabaseSettings;

    #[test]
    fn registry_contains_books() {
        let registry = registry();
        assert_eq!(registry.len(), 1);
        assert!(registry.get_module("books").is_some());
    }

    #[tokio::test]
    async fn migrate_applies_once_per_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("shelf.db");

        let mut settings = Settings::default();
        settings.database = DatabaseSettings {
            url: format!("sqlite://{}?mode=rwc", db_path.display()),
            max_connections: 1,
        };

        assert_eq!(migrate(&settings).await.unwrap(), 1);
        assert_eq!(migrate(&settings).await.unwrap(), 0);
    }
}
