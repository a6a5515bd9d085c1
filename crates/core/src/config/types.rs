use serde::{Deserialize, Serialize};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub save_queue: SaveQueueConfig,
    #[serde(default)]
    pub polling: PollConfig,
}

/// Background execution contexts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    /// Prefix for the names of threads started by the task runner.
    #[serde(default = "default_thread_prefix")]
    pub thread_name_prefix: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: default_thread_prefix(),
        }
    }
}

fn default_thread_prefix() -> String {
    "labflow".to_string()
}

/// Save queue configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SaveQueueConfig {
    /// Number of persistence worker threads.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Queue depth above which each push logs a warning.
    #[serde(default = "default_warn_depth")]
    pub warn_depth: usize,
    /// Channel capacity. Unbounded when absent; when set, `push` blocks while full.
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl Default for SaveQueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            warn_depth: default_warn_depth(),
            capacity: None,
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_warn_depth() -> usize {
    100
}

/// Hardware polling configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between two probes.
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    /// Slack added to the expected duration before a poll times out.
    #[serde(default = "default_timeout_margin")]
    pub timeout_margin_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            timeout_margin_secs: default_timeout_margin(),
        }
    }
}

fn default_poll_interval() -> u64 {
    100
}

fn default_timeout_margin() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.runner.thread_name_prefix, "labflow");
        assert_eq!(config.save_queue.workers, 4);
        assert_eq!(config.save_queue.warn_depth, 100);
        assert_eq!(config.save_queue.capacity, None);
        assert_eq!(config.polling.interval_ms, 100);
        assert_eq!(config.polling.timeout_margin_secs, 5);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
[runner]
thread_name_prefix = "sparc"

[save_queue]
workers = 10
warn_depth = 20
capacity = 500

[polling]
interval_ms = 25
timeout_margin_secs = 2
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.runner.thread_name_prefix, "sparc");
        assert_eq!(
            config.save_queue,
            SaveQueueConfig {
                workers: 10,
                warn_depth: 20,
                capacity: Some(500),
            }
        );
        assert_eq!(config.polling.interval_ms, 25);
        assert_eq!(config.polling.timeout_margin_secs, 2);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let toml = r#"
[save_queue]
workers = 1
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.save_queue.workers, 1);
        assert_eq!(config.save_queue.warn_depth, 100);
    }
}
