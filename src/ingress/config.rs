//! Ingress configuration

/// Configuration for the event ingress
#[derive(Debug, Clone)]
pub struct IngressConfig {
    /// Subject content events are published on
    pub subject: String,

    /// Durable subscription name; its position survives restarts
    pub durable_name: String,

    /// Decoded events buffered between the reader and the worker
    pub queue_capacity: usize,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            subject: "tweets".to_string(),
            durable_name: "notification-service".to_string(),
            queue_capacity: 128,
        }
    }
}

impl IngressConfig {
    /// Set the subject
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the durable subscription name
    pub fn durable_name(mut self, name: impl Into<String>) -> Self {
        self.durable_name = name.into();
        self
    }

    /// Set the queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IngressConfig::default();

        assert_eq!(config.subject, "tweets");
        assert_eq!(config.durable_name, "notification-service");
        assert_eq!(config.queue_capacity, 128);
    }

    #[test]
    fn test_queue_capacity_minimum() {
        let config = IngressConfig::default().queue_capacity(0);
        assert_eq!(config.queue_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = IngressConfig::default()
            .subject("posts")
            .durable_name("fanout")
            .queue_capacity(8);

        assert_eq!(config.subject, "posts");
        assert_eq!(config.durable_name, "fanout");
        assert_eq!(config.queue_capacity, 8);
    }
}
