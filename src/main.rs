use anyhow::Context;
use shelf_kernel::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load Shelf settings")?;

    shelf_telemetry::init(&settings.telemetry);
    if let Err(err) = shelf_telemetry::init_metrics(&settings.telemetry) {
        tracing::warn!(error = ?err, "metrics exporter disabled");
    }

    tracing::info!(
        env = ?settings.environment,
        db = %settings.database.url,
        "shelf-app bootstrap starting"
    );

    shelf_app::serve(&settings).await
}
