use std::time::Duration;

/// Immutable queue configuration, fixed at engine construction.
///
/// Kept separate from the handler registry on purpose: policy constants and
/// handler lookup are different concerns and neither lives in ambient state.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Deliveries whose attempt count has reached this value fail terminally
    /// instead of retrying.
    pub max_attempts: u32,
    /// How long terminal jobs are kept before the sweep deletes them.
    pub retention: chrono::Duration,
    /// Optional deadline for a single handler invocation. `None` leaves
    /// handler execution unbounded; when set, an overrun counts as a handler
    /// failure and goes through the normal retry policy.
    pub handler_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retention: chrono::Duration::days(7),
            handler_timeout: None,
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn retention(mut self, retention: chrono::Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    /// Retry classification: a failed delivery retries while the
    /// transport-reported attempt count (prior deliveries) is below the
    /// budget.
    pub fn retryable(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn documented_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retention, chrono::Duration::days(7));
        assert!(config.handler_timeout.is_none());
    }

    #[test]
    fn retry_budget_boundary() {
        let config = QueueConfig::default();
        assert!(config.retryable(0));
        assert!(config.retryable(1));
        assert!(config.retryable(2));
        assert!(!config.retryable(3));
        assert!(!config.retryable(4));
    }

    proptest! {
        #[test]
        fn retryable_iff_below_budget(attempts in 0u32..100, max in 0u32..100) {
            let config = QueueConfig::new().max_attempts(max);
            prop_assert_eq!(config.retryable(attempts), attempts < max);
        }
    }
}
