use anyhow::Result;
use clap::Parser;

use outpost_core::config::OutpostConfig;
use outpost_daemon::Daemon;
use outpost_daemon::cli::DaemonCli;
use outpost_daemon::{logging, metrics_server};
use outpost_io::IoSettings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = OutpostConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;

    // CLI 오버라이드가 설정 파일과 환경변수보다 우선
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    if cli.validate {
        println!("configuration is valid: {}", cli.config.display());
        println!("{:#?}", IoSettings::from_core(&config));
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(config = %cli.config.display(), "outpost-daemon starting");

    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
    }

    Daemon::build(config, None)?.run().await
}
