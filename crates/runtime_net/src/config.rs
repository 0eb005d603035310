//! Engine configuration and per-request options.
use core_types::ProjectStage;
use runtime_parse::ProtocolNames;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Per-request options. Unset fields fall back to the engine defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// `None` waits forever; zero times out on the next pump.
    pub timeout: Option<Duration>,
    /// Bound on waiting requests; the oldest waiting one is evicted.
    pub queue_size: Option<usize>,
    /// Debounce before the request is admitted to the queue.
    pub delay: Option<Duration>,
    /// Harvest only controls under these ids instead of the whole form.
    pub partial_submit_ids: Option<Vec<String>>,
}

impl RequestOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_queue_size(mut self, size: usize) -> Self {
        self.queue_size = Some(size);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_partial_submit(mut self, ids: Vec<String>) -> Self {
        self.partial_submit_ids = Some(ids);
        self
    }

    pub fn or(self, defaults: &RequestOptions) -> RequestOptions {
        RequestOptions {
            timeout: self.timeout.or(defaults.timeout),
            queue_size: self.queue_size.or(defaults.queue_size),
            delay: self.delay.or(defaults.delay),
            partial_submit_ids: self
                .partial_submit_ids
                .or_else(|| defaults.partial_submit_ids.clone()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    pub timeout_ms: Option<u64>,
    pub queue_size: Option<usize>,
    pub delay_ms: Option<u64>,
    pub partial_submit_ids: Option<Vec<String>>,
}

impl From<&OptionsConfig> for RequestOptions {
    fn from(c: &OptionsConfig) -> Self {
        RequestOptions {
            timeout: c.timeout_ms.map(Duration::from_millis),
            queue_size: c.queue_size,
            delay: c.delay_ms.map(Duration::from_millis),
            partial_submit_ids: c.partial_submit_ids.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub project_stage: ProjectStage,
    /// File name of the client bootstrap script; never re-loaded by patches.
    pub bootstrap_script: String,
    /// Base for resolving relative form actions.
    pub base_url: Option<String>,
    pub defaults: OptionsConfig,
    pub protocol: ProtocolNames,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            project_stage: ProjectStage::Production,
            bootstrap_script: "jsf.js".to_string(),
            base_url: None,
            defaults: OptionsConfig::default(),
            protocol: ProtocolNames::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn request_defaults(&self) -> RequestOptions {
        RequestOptions::from(&self.defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.request_defaults(), RequestOptions::default());
    }

    #[test]
    fn parses_stage_defaults_and_protocol_overrides() {
        let config = EngineConfig::from_toml_str(
            r#"
            project_stage = "development"
            base_url = "http://localhost:8080/app/"

            [defaults]
            timeout_ms = 5000
            queue_size = 3
            partial_submit_ids = ["panel"]

            [protocol]
            partial_header = "X-Partial"
            "#,
        )
        .unwrap();
        assert_eq!(config.project_stage, ProjectStage::Development);
        let defaults = config.request_defaults();
        assert_eq!(defaults.timeout, Some(Duration::from_millis(5000)));
        assert_eq!(defaults.queue_size, Some(3));
        assert_eq!(defaults.delay, None);
        assert_eq!(config.protocol.partial_header, "X-Partial");
        assert_eq!(config.protocol.view_state, "javax.faces.ViewState");
    }

    #[test]
    fn request_options_override_defaults() {
        let defaults = RequestOptions::default()
            .with_timeout(Duration::from_secs(5))
            .with_queue_size(4);
        let merged = RequestOptions::default()
            .with_timeout(Duration::ZERO)
            .or(&defaults);
        assert_eq!(merged.timeout, Some(Duration::ZERO));
        assert_eq!(merged.queue_size, Some(4));
    }

    #[test]
    fn unknown_stage_is_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("project_stage = \"staging\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
