//! Scheduler configuration

use serde::{Deserialize, Serialize};

/// Smallest allowed worker pool size
pub const MIN_WORKERS: usize = 1;

/// Poll interval used when none is given
pub const DEFAULT_INTERVAL: &str = "3m";

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Bounded job queue capacity
    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Largest allowed worker pool size
    #[serde(rename = "max-workers", default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_queue_capacity() -> usize {
    100
}

fn default_max_workers() -> usize {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_workers: default_max_workers(),
        }
    }
}

impl SchedulerConfig {
    /// Whether `count` is an acceptable worker pool size
    pub fn worker_count_in_range(&self, count: usize) -> bool {
        (MIN_WORKERS..=self.max_workers).contains(&count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.max_workers, 10);
    }

    #[test]
    fn test_worker_count_range() {
        let config = SchedulerConfig::default();
        assert!(!config.worker_count_in_range(0));
        assert!(config.worker_count_in_range(1));
        assert!(config.worker_count_in_range(10));
        assert!(!config.worker_count_in_range(11));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: SchedulerConfig = serde_yaml::from_str("max-workers: 4").unwrap();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.queue_capacity, 100);
    }
}
