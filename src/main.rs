use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use weathermetrics::{config::Settings, run_server};

#[derive(Parser)]
#[command(author, version, about = "Windowed temperature metrics over a reading stream", long_about = None)]
struct Cli {
    /// TOML settings file layered over the built-in defaults
    #[arg(short, long, env = "WEATHER_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `weathermetrics=debug`
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_filter: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log_filter))
        .with_target(true)
        .init();

    let settings = Settings::load(cli.config.as_deref())?;
    tracing::info!(
        broker = ?settings.broker.kind,
        store = ?settings.store.kind,
        topic = %settings.broker.topic,
        "weathermetrics starting"
    );
    run_server(settings).await?;
    Ok(())
}
