use std::env;
use std::time::Duration;

/// Longest age or grace period accepted from configuration or a request (ten years).
pub const MAX_WINDOW_HOURS: u64 = 87_600;

/// Converts a window in hours, refusing anything past [`MAX_WINDOW_HOURS`].
pub fn window_from_hours(hours: u64) -> Option<Duration> {
    if hours > MAX_WINDOW_HOURS {
        return None;
    }
    hours.checked_mul(3600).map(Duration::from_secs)
}

/// Lifecycle configuration for asset tracking and reclamation
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Run the periodic cleanup scheduler (default: true)
    pub cleanup_enabled: bool,

    /// Age after which an unconfirmed temporary asset is reclaimed, in hours (default: 24)
    pub temp_max_age_hours: u64,

    /// Delay between an asset becoming orphaned and its deletion, in hours (default: 72)
    pub orphan_grace_period_hours: u64,

    /// Interval between scheduled sweeps, in minutes (default: 360)
    pub cleanup_interval_minutes: u64,

    /// Schedule a deferred deletion check for every orphaned event (default: false)
    pub orphan_auto_cleanup: bool,

    /// Upper bound on concurrently sleeping orphan checks (default: 1000)
    pub max_pending_orphan_checks: usize,

    /// Maximum assets selected by a single reclamation run (default: 1000)
    pub cleanup_batch_size: u64,

    /// Prefix for event channel topics (default: "file_events")
    pub event_topic_prefix: String,

    /// Buffered messages per subscriber before the slowest one starts losing events
    pub event_channel_capacity: usize,

    /// Shared secret expected in the `x-admin-secret` header.
    /// Administrative routes reject every request when unset.
    pub admin_secret: Option<String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            cleanup_enabled: true,
            temp_max_age_hours: 24,
            orphan_grace_period_hours: 72,
            cleanup_interval_minutes: 360,
            orphan_auto_cleanup: false,
            max_pending_orphan_checks: 1000,
            cleanup_batch_size: 1000,
            event_topic_prefix: "file_events".to_string(),
            event_channel_capacity: 1024,
            admin_secret: None,
        }
    }
}

impl LifecycleConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            cleanup_enabled: env::var("CLEANUP_ENABLED")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.cleanup_enabled),

            temp_max_age_hours: env::var("TEMP_FILE_MAX_AGE_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u64| *v <= MAX_WINDOW_HOURS)
                .unwrap_or(default.temp_max_age_hours),

            orphan_grace_period_hours: env::var("ORPHAN_GRACE_PERIOD_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u64| *v <= MAX_WINDOW_HOURS)
                .unwrap_or(default.orphan_grace_period_hours),

            cleanup_interval_minutes: env::var("CLEANUP_INTERVAL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u64| *v > 0 && *v <= MAX_WINDOW_HOURS * 60)
                .unwrap_or(default.cleanup_interval_minutes),

            orphan_auto_cleanup: env::var("ORPHAN_AUTO_CLEANUP")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.orphan_auto_cleanup),

            max_pending_orphan_checks: env::var("MAX_PENDING_ORPHAN_CHECKS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_pending_orphan_checks),

            cleanup_batch_size: env::var("CLEANUP_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u64| *v > 0)
                .unwrap_or(default.cleanup_batch_size),

            event_topic_prefix: env::var("EVENT_TOPIC_PREFIX")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(default.event_topic_prefix),

            event_channel_capacity: env::var("EVENT_CHANNEL_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &usize| *v > 0)
                .unwrap_or(default.event_channel_capacity),

            admin_secret: env::var("ADMIN_SECRET").ok().filter(|v| !v.is_empty()),
        }
    }

    /// Create config for local development (short windows, known secret)
    pub fn development() -> Self {
        Self {
            temp_max_age_hours: 1,
            orphan_grace_period_hours: 1,
            cleanup_interval_minutes: 5,
            orphan_auto_cleanup: true,
            admin_secret: Some("dev-admin-secret".to_string()),
            ..Self::default()
        }
    }

    pub fn temp_max_age(&self) -> Duration {
        Duration::from_secs(self.temp_max_age_hours.saturating_mul(3600))
    }

    pub fn orphan_grace_period(&self) -> Duration {
        Duration::from_secs(self.orphan_grace_period_hours.saturating_mul(3600))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_minutes.saturating_mul(60))
    }
}
