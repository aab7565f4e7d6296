//! Daemon assembly -- IO manager construction, status reporting and shutdown.
//!
//! The [`Daemon`] owns the loaded configuration and the [`IoManager`].
//! It starts the manager, periodically logs channel occupancy and counters,
//! and stops the manager (final flush) once the shutdown future resolves.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use outpost_core::config::OutpostConfig;
use outpost_core::metrics as m;
use outpost_core::pipeline::Pipeline;
use outpost_io::{IoHandle, IoManager, IoManagerBuilder, IoSettings, Sender};

/// Interval between status log lines.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// The outpost daemon.
pub struct Daemon {
    /// Loaded and validated configuration.
    config: OutpostConfig,
    /// IO core.
    manager: IoManager,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Daemon {
    /// Build the daemon from a validated configuration.
    ///
    /// Without a `sender` every flush is counted as failed; eligible
    /// categories are still persisted to the fail cache when enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the fail cache directory or the debug output
    /// file cannot be opened.
    pub fn build(config: OutpostConfig, sender: Option<Arc<dyn Sender>>) -> Result<Self> {
        let settings = IoSettings::from_core(&config);
        let mut builder = IoManagerBuilder::new().settings(settings);
        match sender {
            Some(sender) => builder = builder.sender(sender),
            None => tracing::warn!(
                "no network sender available, running in file sink / fail cache mode"
            ),
        }
        let manager = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build io manager: {}", e))?;

        Ok(Self {
            config,
            manager,
            start_time: Instant::now(),
        })
    }

    /// Submission handle for collectors.
    pub fn handle(&self) -> IoHandle {
        self.manager.handle()
    }

    /// Loaded configuration.
    pub fn config(&self) -> &OutpostConfig {
        &self.config
    }

    /// IO manager (diagnostics).
    pub fn manager(&self) -> &IoManager {
        &self.manager
    }

    /// Run until SIGTERM/SIGINT, then stop the IO manager.
    pub async fn run(self) -> Result<()> {
        self.run_until(wait_for_shutdown_signal()).await
    }

    /// Run until `shutdown` resolves, then stop the IO manager.
    ///
    /// The manager is stopped (final flush) even if `shutdown` fails.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = Result<&'static str>>,
    {
        self.manager
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start io manager: {}", e))?;
        tracing::info!("outpost-daemon running");

        let mut status = tokio::time::interval(STATUS_INTERVAL);
        status.tick().await;
        tokio::pin!(shutdown);

        let signal = loop {
            tokio::select! {
                signal = &mut shutdown => break signal,
                _ = status.tick() => self.report_status().await,
            }
        };

        match &signal {
            Ok(name) => tracing::info!(signal = *name, "shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "shutdown signal handler failed"),
        }

        let stopped = self
            .manager
            .stop()
            .await
            .map_err(|e| anyhow::anyhow!("failed to stop io manager: {}", e));
        self.report_status().await;
        tracing::info!("outpost-daemon shut down");

        signal?;
        stopped
    }

    /// Log channel occupancy, counters and health.
    async fn report_status(&self) {
        let uptime_secs = self.start_time.elapsed().as_secs();
        if self.config.metrics.enabled {
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        let health = self.manager.health_check().await;
        let channels = serde_json::to_string(&self.manager.chan_usage()).unwrap_or_default();
        let counters = serde_json::to_string(&self.manager.category_stats()).unwrap_or_default();
        tracing::info!(
            uptime_secs,
            health = ?health,
            dropped_total = self.manager.dropped_total(),
            channels = channels.as_str(),
            counters = counters.as_str(),
            "io status"
        );
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
