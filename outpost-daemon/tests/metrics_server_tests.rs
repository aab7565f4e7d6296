//! Integration tests for metrics server functionality.

use outpost_core::config::MetricsConfig;
use outpost_daemon::metrics_server;
use serial_test::serial;

#[test]
#[serial]
fn test_install_metrics_recorder_fails_with_invalid_address() {
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "999.999.999.999".to_string(),
        port: 9529,
        endpoint: "/metrics".to_string(),
    };

    let result = metrics_server::install_metrics_recorder(&config);
    assert!(
        result.is_err(),
        "install_metrics_recorder should fail with invalid address"
    );
}

#[test]
#[serial]
fn test_install_metrics_recorder_rejects_custom_endpoint() {
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "127.0.0.1".to_string(),
        port: 19529,
        endpoint: "/custom".to_string(),
    };

    let err = metrics_server::install_metrics_recorder(&config).unwrap_err();
    assert!(err.to_string().contains("unsupported metrics endpoint"));
}
