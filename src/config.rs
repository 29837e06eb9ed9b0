//! Store timing configuration

use std::time::Duration;

/// Default poll interval for link, collection and entry stores
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Default spacing between retries of an immutable entry fetch
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of attempts for an immutable entry fetch
pub const DEFAULT_MAX_RETRIES: u32 = 4;

/// Timing configuration shared by the stores built from one [`ZomeStores`]
///
/// [`ZomeStores`]: crate::holochain::ZomeStores
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Delay between the end of one fetch and the start of the next
    pub poll_interval: Duration,
    /// Delay between failed attempts of a retrying fetch
    pub retry_interval: Duration,
    /// Total attempts of a retrying fetch before giving up
    pub max_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl StoreConfig {
    /// Create config from environment
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env_millis("HOLOCHAIN_STORES_POLL_INTERVAL_MS")
                .unwrap_or(defaults.poll_interval),
            retry_interval: env_millis("HOLOCHAIN_STORES_RETRY_INTERVAL_MS")
                .unwrap_or(defaults.retry_interval),
            max_retries: std::env::var("HOLOCHAIN_STORES_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(20));
        assert_eq!(config.retry_interval, Duration::from_secs(1));
        assert_eq!(config.max_retries, 4);
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("HOLOCHAIN_STORES_POLL_INTERVAL_MS", "250");
        std::env::set_var("HOLOCHAIN_STORES_MAX_RETRIES", "not-a-number");

        let config = StoreConfig::from_env();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        // Unparseable values fall back to the default
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);

        std::env::remove_var("HOLOCHAIN_STORES_POLL_INTERVAL_MS");
        std::env::remove_var("HOLOCHAIN_STORES_MAX_RETRIES");
    }

    #[test]
    fn test_builders() {
        let config = StoreConfig::default()
            .with_poll_interval(Duration::from_millis(100))
            .with_retry_interval(Duration::from_millis(10))
            .with_max_retries(2);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.retry_interval, Duration::from_millis(10));
        assert_eq!(config.max_retries, 2);
    }
}
