use std::time::Duration;

use coursecast_core::quiet_hours::QuietHoursClock;

/// Default interval between deferred-queue sweeps.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default interval between digest polls.
const DEFAULT_DIGEST_POLL_INTERVAL_SECS: u64 = 3600;

/// Default interval between retention passes.
const DEFAULT_RETENTION_INTERVAL_SECS: u64 = 3600;

/// Timing and clock settings for the delivery loops.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Wall clock used to compare against quiet-hours bounds.
    pub quiet_hours_clock: QuietHoursClock,
    pub sweep_interval: Duration,
    pub digest_poll_interval: Duration,
    pub retention_interval: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            quiet_hours_clock: QuietHoursClock::default(),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            digest_poll_interval: Duration::from_secs(DEFAULT_DIGEST_POLL_INTERVAL_SECS),
            retention_interval: Duration::from_secs(DEFAULT_RETENTION_INTERVAL_SECS),
        }
    }
}

impl DeliveryConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values fall back to the default with a warning.
    ///
    /// | Env Var                        | Default |
    /// |--------------------------------|---------|
    /// | `QUIET_HOURS_CLOCK`            | `local` |
    /// | `DEFERRED_SWEEP_INTERVAL_SECS` | `60`    |
    /// | `DIGEST_POLL_INTERVAL_SECS`    | `3600`  |
    /// | `RETENTION_INTERVAL_SECS`      | `3600`  |
    pub fn from_env() -> Self {
        let quiet_hours_clock = match std::env::var("QUIET_HOURS_CLOCK") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(value = %raw, error = %e, "Ignoring QUIET_HOURS_CLOCK");
                QuietHoursClock::default()
            }),
            Err(_) => QuietHoursClock::default(),
        };

        Self {
            quiet_hours_clock,
            sweep_interval: secs_from_env("DEFERRED_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS),
            digest_poll_interval: secs_from_env(
                "DIGEST_POLL_INTERVAL_SECS",
                DEFAULT_DIGEST_POLL_INTERVAL_SECS,
            ),
            retention_interval: secs_from_env(
                "RETENTION_INTERVAL_SECS",
                DEFAULT_RETENTION_INTERVAL_SECS,
            ),
        }
    }
}

fn secs_from_env(name: &str, default: u64) -> Duration {
    let secs = match std::env::var(name) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(v) if v > 0 => v,
            _ => {
                tracing::warn!(var = name, value = %raw, default, "Ignoring invalid interval");
                default
            }
        },
        Err(_) => default,
    };
    Duration::from_secs(secs)
}
