use std::env;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_LOADING_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Retry budget for cheap queries the UI fires while the user types.
pub const QUICK_QUERY_RETRIES: u32 = 100;
/// Retry budget for imports, exports and replays, which can take minutes.
pub const LONG_OPERATION_RETRIES: u32 = 1000;

/// Timing knobs for the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Length of one retry slot.
    pub poll_interval: Duration,
    /// How long a request may run before the loading indicator is shown.
    pub loading_delay: Duration,
    /// Overall wait ceiling used when a call does not pick its own budget.
    pub default_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            loading_delay: DEFAULT_LOADING_DELAY,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl BrokerConfig {
    /// Defaults overridden by `MITO_POLL_INTERVAL_MS`, `MITO_LOADING_DELAY_MS`
    /// and `MITO_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(ms) = parse_var(&lookup, "MITO_POLL_INTERVAL_MS") {
            if ms == 0 {
                warn!(target: "mito::config", "ignoring zero MITO_POLL_INTERVAL_MS");
            } else {
                config.poll_interval = Duration::from_millis(ms);
            }
        }
        if let Some(ms) = parse_var(&lookup, "MITO_LOADING_DELAY_MS") {
            config.loading_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var(&lookup, "MITO_REQUEST_TIMEOUT_SECS") {
            config.default_timeout = Duration::from_secs(secs);
        }
        config
    }

    /// Retry count equivalent to `default_timeout` at `poll_interval`.
    pub fn default_max_retries(&self) -> u32 {
        let interval = self.poll_interval.as_millis().max(1);
        let retries = self.default_timeout.as_millis() / interval;
        u32::try_from(retries).unwrap_or(u32::MAX)
    }

    /// Wall-clock budget for `max_retries` slots.
    pub fn wait_budget(&self, max_retries: u32) -> Duration {
        self.poll_interval.saturating_mul(max_retries)
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(target: "mito::config", key, value = %raw, error = %err, "ignoring invalid setting");
            None
        }
    }
}
