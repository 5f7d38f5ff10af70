//! Registry configuration

/// Configuration for the delivery registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Notifications buffered per session before it counts as a slow consumer
    pub session_buffer: usize,

    /// Maximum live sessions per recipient (0 = unlimited)
    pub max_sessions_per_recipient: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            session_buffer: 64,
            max_sessions_per_recipient: 16,
        }
    }
}

impl RegistryConfig {
    /// Set the per-session buffer capacity
    pub fn session_buffer(mut self, capacity: usize) -> Self {
        self.session_buffer = capacity.max(1);
        self
    }

    /// Set the per-recipient session limit
    pub fn max_sessions_per_recipient(mut self, max: usize) -> Self {
        self.max_sessions_per_recipient = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.session_buffer, 64);
        assert_eq!(config.max_sessions_per_recipient, 16);
    }

    #[test]
    fn test_session_buffer_minimum() {
        let config = RegistryConfig::default().session_buffer(0);
        assert_eq!(config.session_buffer, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .session_buffer(8)
            .max_sessions_per_recipient(0);

        assert_eq!(config.session_buffer, 8);
        assert_eq!(config.max_sessions_per_recipient, 0);
    }
}
