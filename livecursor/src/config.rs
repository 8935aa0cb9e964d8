use livecursor_common::time::Duration;
use livecursor_common::DEFAULT_BATCH_BUFFER;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Tunables for a [`Subscription`](crate::Subscription).
#[derive(SmartDefault, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// How many batches may queue between the pump and the cursor before the
    /// pump stops reading from the source. Sources bound their own queues; a
    /// source may drop a subscription that stays blocked, which faults the
    /// cursor.
    #[default(DEFAULT_BATCH_BUFFER)]
    pub buffer_size: usize,
    /// Used by waits that do not pass their own timeout. `None` waits forever.
    pub default_wait_timeout: Option<Duration>,
    /// Deliver pre-existing matching records before live updates.
    pub replay: bool,
}

impl SubscriptionConfig {
    pub fn builder() -> SubscriptionConfigBuilder {
        SubscriptionConfigBuilder::default()
    }
}

/// Builder for [`SubscriptionConfig`].
///
/// # Example
/// ```
/// use livecursor::SubscriptionConfig;
/// use std::time::Duration;
///
/// let config = SubscriptionConfig::builder()
///     .replay(true)
///     .default_wait_timeout(Duration::from_secs(1))
///     .build();
/// assert!(config.replay);
/// ```
#[derive(Default, Debug, Clone)]
pub struct SubscriptionConfigBuilder {
    buffer_size: Option<usize>,
    default_wait_timeout: Option<Duration>,
    replay: Option<bool>,
}

impl SubscriptionConfigBuilder {
    /// Capacity of the batch channel. Zero is raised to one.
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    pub fn default_wait_timeout(mut self, timeout: Duration) -> Self {
        self.default_wait_timeout = Some(timeout);
        self
    }

    pub fn replay(mut self, replay: bool) -> Self {
        self.replay = Some(replay);
        self
    }

    pub fn build(self) -> SubscriptionConfig {
        let mut config = SubscriptionConfig::default();
        if let Some(buffer_size) = self.buffer_size {
            config.buffer_size = buffer_size.max(1);
        }
        if let Some(timeout) = self.default_wait_timeout {
            config.default_wait_timeout = Some(timeout);
        }
        if let Some(replay) = self.replay {
            config.replay = replay;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SubscriptionConfig::default();
        assert_eq!(config.buffer_size, DEFAULT_BATCH_BUFFER);
        assert_eq!(config.default_wait_timeout, None);
        assert!(!config.replay);
    }

    #[test]
    fn builder_overrides() {
        let config = SubscriptionConfig::builder()
            .buffer_size(0)
            .default_wait_timeout(Duration::from_millis(250))
            .replay(true)
            .build();
        assert_eq!(config.buffer_size, 1);
        assert_eq!(config.default_wait_timeout, Some(Duration::from_millis(250)));
        assert!(config.replay);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: SubscriptionConfig = serde_json::from_str(r#"{"replay":true}"#).unwrap();
        assert!(config.replay);
        assert_eq!(config.buffer_size, DEFAULT_BATCH_BUFFER);
    }
}
