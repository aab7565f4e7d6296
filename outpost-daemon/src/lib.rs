//! Outpost daemon library.
//!
//! Exposes the daemon building blocks for integration testing.
//! In production, `outpost-daemon` is used as a binary (main.rs).

pub mod cli;
pub mod daemon;
pub mod logging;
pub mod metrics_server;

pub use daemon::Daemon;
