//! # lumen-telemetry
//!
//! Process-wide tracing setup. Call [`init_telemetry`] once at startup;
//! everything else in the workspace just emits `tracing` events.

#![deny(unsafe_code)]

use tracing_subscriber::EnvFilter;

/// Subscriber configuration assembled by the embedding application.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default level for all targets.
    pub log_level: String,
    /// Per-module overrides, e.g. `("lumen_llm", "debug")`.
    pub module_levels: Vec<(String, String)>,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), module_levels: Vec::new(), json: false }
    }
}

impl TelemetryConfig {
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_module_level(mut self, module: impl Into<String>, level: impl Into<String>) -> Self {
        self.module_levels.push((module.into(), level.into()));
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Filter directive string equivalent to this configuration.
    pub fn directives(&self) -> String {
        let mut directives = self.log_level.clone();
        for (module, level) in &self.module_levels {
            directives.push_str(&format!(",{module}={level}"));
        }
        directives
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured levels
/// when set. Returns false if a subscriber was already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.directives()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_are_the_base_level() {
        assert_eq!(TelemetryConfig::default().directives(), "info");
    }

    #[test]
    fn module_overrides_append_in_order() {
        let config = TelemetryConfig::default()
            .with_log_level("warn")
            .with_module_level("lumen_llm", "debug")
            .with_module_level("lumen_agents", "trace");
        assert_eq!(config.directives(), "warn,lumen_llm=debug,lumen_agents=trace");
    }

    #[test]
    fn init_is_idempotent() {
        let config = TelemetryConfig::default();
        let first = init_telemetry(&config);
        let second = init_telemetry(&config);
        assert!(first);
        assert!(!second);
    }
}
