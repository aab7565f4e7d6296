//! Integration tests for daemon assembly and CLI parsing.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use outpost_core::category::Category;
use outpost_core::config::OutpostConfig;
use outpost_core::pipeline::BoxFuture;
use outpost_core::point::{Point, PointBuilder};
use outpost_daemon::Daemon;
use outpost_daemon::cli::DaemonCli;
use outpost_io::{IoData, IoError, Sender};

struct AcceptAll;

impl Sender for AcceptAll {
    fn write<'a>(
        &'a self,
        _category: &'a str,
        _points: Vec<Point>,
    ) -> BoxFuture<'a, Result<Vec<Point>, IoError>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}

fn config_in(dir: &std::path::Path) -> OutpostConfig {
    let mut config = OutpostConfig::default();
    config.general.data_dir = dir.display().to_string();
    config.io.enable_cache = true;
    config
}

fn point() -> Point {
    PointBuilder::new("cpu")
        .field("usage", 0.5)
        .timestamp(1)
        .build()
        .unwrap()
}

#[test]
fn test_cli_parses_overrides() {
    let cli = DaemonCli::try_parse_from([
        "outpost-daemon",
        "--config",
        "/tmp/outpost.toml",
        "--log-level",
        "debug",
        "--log-format",
        "pretty",
        "--validate",
    ])
    .unwrap();

    assert_eq!(cli.config.to_str(), Some("/tmp/outpost.toml"));
    assert_eq!(cli.log_level.as_deref(), Some("debug"));
    assert_eq!(cli.log_format.as_deref(), Some("pretty"));
    assert!(cli.validate);
}

#[test]
fn test_cli_defaults() {
    let cli = DaemonCli::try_parse_from(["outpost-daemon"]).unwrap();
    assert_eq!(cli.config.to_str(), Some("/etc/outpost/outpost.toml"));
    assert!(cli.log_level.is_none());
    assert!(!cli.validate);
}

#[tokio::test]
async fn test_daemon_build_creates_cache_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::build(config_in(dir.path()), None).unwrap();

    assert_eq!(daemon.manager().state_name(), "initialized");
    assert!(dir.path().join("cache").join("logging").exists());
    assert!(!dir.path().join("cache").join("metric").exists());
}

#[tokio::test]
async fn test_daemon_runs_until_shutdown_and_flushes() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::build(config_in(dir.path()), Some(Arc::new(AcceptAll))).unwrap();
    let handle = daemon.handle();

    let shutdown = async move {
        handle
            .submit(IoData::new(Category::Metric, "cpu", vec![point()]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok("test")
    };

    daemon.run_until(shutdown).await.unwrap();
}

#[tokio::test]
async fn test_daemon_without_sender_caches_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::build(config_in(dir.path()), None).unwrap();
    let handle = daemon.handle();

    let shutdown = async move {
        handle
            .submit(IoData::new(Category::Logging, "nginx", vec![point()]))
            .await
            .unwrap();
        Ok("test")
    };
    daemon.run_until(shutdown).await.unwrap();

    let rebuilt = Daemon::build(config_in(dir.path()), None).unwrap();
    assert_eq!(rebuilt.manager().fail_cache_len(Category::Logging), 1);
}

#[tokio::test]
async fn test_shutdown_error_is_reported_after_stop() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::build(config_in(dir.path()), None).unwrap();
    let result = daemon
        .run_until(async { Err(anyhow::anyhow!("no signal handler")) })
        .await;
    assert!(result.is_err());
}
