//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use saga::{CompensationPolicy, OnExhausted, ProcessorConfig};
use tracing_subscriber::EnvFilter;

/// Server and saga configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `SAGA_COMPENSATION_ATTEMPTS`: attempts per compensation (default: `3`)
/// - `SAGA_COMPENSATION_BACKOFF_MS`: linear retry backoff (default: `100`)
/// - `SAGA_ON_COMPENSATION_EXHAUSTED`: `halt` or `continue` (default: `halt`)
/// - `SAGA_EVENT_BUFFER`: outcome event buffer (default: `256`)
/// - `TRAVEL_FAIL_STEP`: booking service whose forward command always fails,
///   for demonstrating rollbacks (`flight`, `hotel`, `payment`; unset by default)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub compensation_attempts: u32,
    pub compensation_backoff_ms: u64,
    pub on_compensation_exhausted: OnExhausted,
    pub event_buffer: usize,
    pub fail_step: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let on_compensation_exhausted = match lookup("SAGA_ON_COMPENSATION_EXHAUSTED") {
            Some(value) => value.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring SAGA_ON_COMPENSATION_EXHAUSTED");
                defaults.on_compensation_exhausted
            }),
            None => defaults.on_compensation_exhausted,
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            compensation_attempts: parse_var(&lookup, "SAGA_COMPENSATION_ATTEMPTS")
                .unwrap_or(defaults.compensation_attempts),
            compensation_backoff_ms: parse_var(&lookup, "SAGA_COMPENSATION_BACKOFF_MS")
                .unwrap_or(defaults.compensation_backoff_ms),
            on_compensation_exhausted,
            event_buffer: parse_var(&lookup, "SAGA_EVENT_BUFFER").unwrap_or(defaults.event_buffer),
            fail_step: lookup("TRAVEL_FAIL_STEP").filter(|step| !step.trim().is_empty()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the tracing filter for `log_level`, or `info` if it does not
    /// parse as a filter directive.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.log_level).unwrap_or_else(|e| {
            eprintln!("ignoring invalid RUST_LOG {:?}: {e}", self.log_level);
            EnvFilter::new("info")
        })
    }

    /// Returns the saga processor configuration.
    pub fn processor_config(&self) -> ProcessorConfig {
        let policy = CompensationPolicy::retry(
            self.compensation_attempts,
            Duration::from_millis(self.compensation_backoff_ms),
        )
        .on_exhausted(self.on_compensation_exhausted);

        ProcessorConfig::new()
            .with_compensation(policy)
            .with_event_buffer(self.event_buffer)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        let processor = ProcessorConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            compensation_attempts: processor.compensation.max_attempts,
            compensation_backoff_ms: processor.compensation.backoff.as_millis() as u64,
            on_compensation_exhausted: processor.compensation.on_exhausted,
            event_buffer: processor.event_buffer,
            fail_step: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.compensation_attempts, 3);
        assert_eq!(config.compensation_backoff_ms, 100);
        assert_eq!(config.on_compensation_exhausted, OnExhausted::Halt);
        assert_eq!(config.event_buffer, 256);
        assert!(config.fail_step.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_from_lookup_reads_every_variable() {
        let config = Config::from_lookup(lookup(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8081"),
            ("RUST_LOG", "debug"),
            ("SAGA_COMPENSATION_ATTEMPTS", "5"),
            ("SAGA_COMPENSATION_BACKOFF_MS", "20"),
            ("SAGA_ON_COMPENSATION_EXHAUSTED", "continue"),
            ("SAGA_EVENT_BUFFER", "64"),
            ("TRAVEL_FAIL_STEP", "payment"),
        ]));

        assert_eq!(config.addr(), "127.0.0.1:8081");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.fail_step.as_deref(), Some("payment"));

        let processor = config.processor_config();
        assert_eq!(processor.compensation.max_attempts, 5);
        assert_eq!(processor.compensation.backoff, Duration::from_millis(20));
        assert_eq!(processor.compensation.on_exhausted, OnExhausted::Continue);
        assert_eq!(processor.event_buffer, 64);
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "not-a-port"),
            ("SAGA_COMPENSATION_ATTEMPTS", "-1"),
            ("SAGA_ON_COMPENSATION_EXHAUSTED", "retry"),
            ("TRAVEL_FAIL_STEP", "  "),
        ]));

        assert_eq!(config.port, 3000);
        assert_eq!(config.compensation_attempts, 3);
        assert_eq!(config.on_compensation_exhausted, OnExhausted::Halt);
        assert!(config.fail_step.is_none());
    }

    #[test]
    fn test_env_filter_uses_log_level() {
        let config = Config {
            log_level: "saga=debug,info".to_string(),
            ..Config::default()
        };
        let filter = config.env_filter().to_string();
        assert!(filter.contains("saga=debug"));
        assert!(filter.contains("info"));
    }

    #[test]
    fn test_invalid_log_level_falls_back_to_info() {
        let config = Config {
            log_level: "saga=loud".to_string(),
            ..Config::default()
        };
        assert_eq!(config.env_filter().to_string(), "info");
    }

    #[test]
    fn test_default_processor_config_matches_saga_defaults() {
        assert_eq!(Config::default().processor_config(), ProcessorConfig::default());
    }
}
