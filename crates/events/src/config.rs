use serde::{Deserialize, Serialize};

/// Tunables of a [`MessageBus`](crate::MessageBus).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Label attached to log lines and spans.
    pub name: String,
    /// Commands that may wait for the dispatch loop before submitters block.
    /// Values below 1 are raised to 1.
    pub submission_buffer: usize,
    /// Initial capacity of the pending-event queue.
    pub queue_capacity: usize,
}

impl BusConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub(crate) fn channel_capacity(&self) -> usize {
        self.submission_buffer.max(1)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            name: "message-bus".to_string(),
            submission_buffer: 1,
            queue_capacity: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: BusConfig = serde_json::from_str(r#"{ "name": "orders" }"#).unwrap();
        assert_eq!(cfg.name, "orders");
        assert_eq!(cfg.submission_buffer, 1);
        assert_eq!(cfg.queue_capacity, 10);
    }

    #[test]
    fn zero_buffer_is_raised_to_one() {
        let cfg = BusConfig {
            submission_buffer: 0,
            ..BusConfig::default()
        };
        assert_eq!(cfg.channel_capacity(), 1);
    }
}
