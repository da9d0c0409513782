//! Per-section validation: presence, rooms, bridge, and gateway.

use crate::schema::OfficeConfig;

use super::helpers::validate_range;

/// Validate heartbeat timings. A session must go stale before it times out.
pub(crate) fn validate_presence(errors: &mut Vec<String>, config: &OfficeConfig) {
    let p = &config.presence;
    validate_range(errors, "presence.stale_after_secs", p.stale_after_secs, 1, 600);
    validate_range(errors, "presence.timeout_secs", p.timeout_secs, 2, 3600);
    validate_range(errors, "presence.sweep_interval_ms", p.sweep_interval_ms, 50, 60_000);

    if p.timeout_secs <= p.stale_after_secs {
        errors.push(format!(
            "presence.timeout_secs = {} must be greater than presence.stale_after_secs = {}",
            p.timeout_secs, p.stale_after_secs
        ));
    }
}

/// Validate room sizing.
pub(crate) fn validate_rooms(errors: &mut Vec<String>, config: &OfficeConfig) {
    let r = &config.rooms;
    validate_range(errors, "rooms.grace_period_secs", r.grace_period_secs, 0, 86_400);
    validate_range(errors, "rooms.max_members", r.max_members, 1, 1024);
    validate_range(errors, "rooms.broadcast_capacity", r.broadcast_capacity, 16, 65_536);
}

/// Validate host call limits.
pub(crate) fn validate_bridge(errors: &mut Vec<String>, config: &OfficeConfig) {
    validate_range(
        errors,
        "bridge.host_timeout_ms",
        config.bridge.host_timeout_ms,
        100,
        60_000,
    );
}

/// Validate listener and rate-limit settings.
pub(crate) fn validate_gateway(errors: &mut Vec<String>, config: &OfficeConfig) {
    let g = &config.gateway;
    if g.bind.trim().is_empty() {
        errors.push("gateway.bind must not be empty".into());
    }
    validate_range(errors, "gateway.hello_timeout_secs", g.hello_timeout_secs, 1, 120);
    validate_range(errors, "gateway.rate_per_sec", g.rate_per_sec, 1, 1000);
    validate_range(errors, "gateway.outbound_buffer", g.outbound_buffer, 8, 65_536);

    if g.burst < g.rate_per_sec {
        errors.push(format!(
            "gateway.burst = {} must be at least gateway.rate_per_sec = {}",
            g.burst, g.rate_per_sec
        ));
    }
}
