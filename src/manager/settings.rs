use log::warn;
use std::time::Duration;

/// Timing knobs of a [SerialComManager](crate::SerialComManager)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Longest a write may go without sending a byte before it fails
    pub write_timeout: Duration,
    /// How often blocked reads and writes look at the device again
    pub poll_interval: Duration,
    /// How often listener threads look at the device
    pub listener_poll_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            write_timeout: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(5),
            listener_poll_interval: Duration::from_millis(10),
        }
    }
}

impl ManagerConfig {
    /// Defaults, overridden by `SERIALCOM_WRITE_TIMEOUT_MS`, `SERIALCOM_POLL_INTERVAL_MS` and
    /// `SERIALCOM_LISTENER_POLL_MS` where they are set
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = ManagerConfig::default();
        let millis = |key: &str, value: &mut Duration| {
            if let Some(raw) = lookup(key) {
                match raw.trim().parse::<u64>() {
                    Ok(ms) => *value = Duration::from_millis(ms),
                    Err(e) => warn!("ignoring {}={:?}: {}", key, raw, e),
                }
            }
        };
        millis("SERIALCOM_WRITE_TIMEOUT_MS", &mut config.write_timeout);
        millis("SERIALCOM_POLL_INTERVAL_MS", &mut config.poll_interval);
        millis("SERIALCOM_LISTENER_POLL_MS", &mut config.listener_poll_interval);
        config
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn listener_poll_interval(mut self, interval: Duration) -> Self {
        self.listener_poll_interval = interval.max(Duration::from_millis(1));
        self
    }
}
