//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# odooxr portal configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[presence]
# stale_after_secs = 15     # 1-600, no heartbeat for this long marks a session stale
# timeout_secs = 45         # 2-3600, must exceed stale_after_secs; closes the session
# sweep_interval_ms = 1000  # 50-60000

[rooms]
# grace_period_secs = 30    # 0-86400, empty rooms survive this long
# max_members = 64          # 1-1024
# broadcast_capacity = 1024 # 16-65536

[bridge]
# host_timeout_ms = 5000    # 100-60000

[host]
# demo_data = true
# default_groups = ["base.group_user"]

[gateway]
# bind = "127.0.0.1"
# port = 8765
# hello_timeout_secs = 10   # 1-120
# rate_per_sec = 20         # 1-1000
# burst = 40                # >= rate_per_sec
# outbound_buffer = 256     # 8-65536

[logging]
# level = "INFO"            # TRACE, DEBUG, INFO, WARNING, ERROR
# log_deltas = false
"##
    .to_string()
}
