//! Tests for the full validation pipeline.

use super::*;
use crate::schema::*;

#[test]
fn default_config_validates() {
    let config = OfficeConfig::default();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_timeout_not_after_stale() {
    let mut config = OfficeConfig::default();
    config.presence.stale_after_secs = 30;
    config.presence.timeout_secs = 30;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("presence.timeout_secs"));
    assert!(err.contains("must be greater"));
}

#[test]
fn catches_sweep_interval_too_small() {
    let mut config = OfficeConfig::default();
    config.presence.sweep_interval_ms = 10;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("presence.sweep_interval_ms"));
}

#[test]
fn catches_zero_max_members() {
    let mut config = OfficeConfig::default();
    config.rooms.max_members = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("rooms.max_members"));
}

#[test]
fn catches_tiny_broadcast_capacity() {
    let mut config = OfficeConfig::default();
    config.rooms.broadcast_capacity = 4;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("rooms.broadcast_capacity"));
}

#[test]
fn catches_host_timeout_out_of_range() {
    let mut config = OfficeConfig::default();
    config.bridge.host_timeout_ms = 10;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("bridge.host_timeout_ms"));
}

#[test]
fn catches_burst_below_rate() {
    let mut config = OfficeConfig::default();
    config.gateway.rate_per_sec = 50;
    config.gateway.burst = 10;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("gateway.burst"));
}

#[test]
fn catches_empty_bind() {
    let mut config = OfficeConfig::default();
    config.gateway.bind = "  ".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("gateway.bind"));
}

#[test]
fn collects_multiple_errors() {
    let mut config = OfficeConfig::default();
    config.rooms.max_members = 0;
    config.gateway.rate_per_sec = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("rooms.max_members"));
    assert!(err.contains("gateway.rate_per_sec"));
    assert!(err.contains("; "));
}
