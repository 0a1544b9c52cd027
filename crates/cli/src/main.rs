use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use shelf_kernel::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "shelf", version, about = "Shelf book catalog service")]
struct Cli {
    /// Directory holding base.toml and <env>.toml
    #[arg(long, global = true, env = "SHELF_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service until Ctrl-C
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Print the resolved configuration with secrets redacted
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config_dir {
        Some(dir) => Settings::load_from(dir.clone()),
        None => Settings::load(),
    }
    .context("failed to load Shelf settings")?;

    match cli.command {
        Command::Serve => {
            shelf_telemetry::init(&settings.telemetry);
            if let Err(err) = shelf_telemetry::init_metrics(&settings.telemetry) {
                tracing::warn!(error = ?err, "metrics exporter disabled");
            }
            shelf_app::serve(&settings).await
        }
        Command::Migrate => {
            shelf_telemetry::init(&settings.telemetry);
            let applied = shelf_app::migrate(&settings).await?;
            println!("applied {applied} migration(s)");
            Ok(())
        }
        Command::Config => {
            println!("{settings:#?}");
            Ok(())
        }
    }
}
