// Scan counters
pub const SCAN_RUNS_COUNTER: &str = "flag_janitor_scan_runs_total";
pub const SCAN_FLAGS_EXPIRED_COUNTER: &str = "flag_janitor_scan_flags_expired_total";
pub const SCAN_DURATION_SECONDS: &str = "flag_janitor_scan_duration_seconds";

// Cleanup counters, labelled by `outcome`
pub const CLEANUP_REQUESTS_COUNTER: &str = "flag_janitor_cleanup_requests_total";
pub const ISSUE_TRACKER_ERRORS_COUNTER: &str = "flag_janitor_issue_tracker_errors_total";
