use anyhow::Result;
use clap::Parser;
use tracing::instrument::WithSubscriber;

use activity_infrastructure::{AppConfig, CONFIG_ENV};

#[derive(Parser, Debug)]
#[command(name = "activity-feed")]
#[command(about = "Live activity feed server", long_about = None)]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if let Some(config) = args.config {
        std::env::set_var(CONFIG_ENV, config);
    }

    let config = AppConfig::load()
        .with_subscriber(activity_bootstrap::telemetry::startup_subscriber())
        .await?;
    let _log_guard = activity_bootstrap::telemetry::init(config.log_dir.as_deref());

    activity_bootstrap::lifecycle::run_with_config(config).await
}
