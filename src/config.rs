use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::{ProvisionError, Result, registry::CredentialKind};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// orchestration engine connection
    pub engine: EngineConfig,
    /// deploy pipeline tuning
    #[serde(default)]
    pub deploy: DeployConfig,
    /// credential payload shaping overrides
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    /// template store location
    #[serde(default)]
    pub templates: TemplatesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// engine base url, e.g. `https://n8n.example.com`
    pub base_url: String,
    /// api key sent with every request
    #[serde(default)]
    pub api_key: String,
    /// how the api key is presented to the engine
    #[serde(default)]
    pub auth: EngineAuth,
    /// http request timeout in milliseconds, defaults to 15000
    #[serde(default = "default_engine_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineAuth {
    /// `X-N8N-API-KEY: <key>`
    #[default]
    ApiKey,
    /// `Authorization: Bearer <key>`
    Bearer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    /// timeout of a single pipeline step in milliseconds, defaults to 30000
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    /// activation retries after the first failure, defaults to 1
    #[serde(default = "default_activation_retries")]
    pub activation_retries: u32,
    /// fixed delay between activation attempts in milliseconds, defaults to 2000
    #[serde(default = "default_activation_retry_delay_ms")]
    pub activation_retry_delay_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NormalizerConfig {
    /// kinds whose credential fields are sent at the top level instead of under `data`
    #[serde(default)]
    pub flat_payload_kinds: Vec<CredentialKind>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplatesConfig {
    /// directory holding `<template_id>.json` files
    pub dir: Option<PathBuf>,
}

fn default_engine_timeout_ms() -> u64 {
    15_000
}

fn default_step_timeout_ms() -> u64 {
    30_000
}

fn default_activation_retries() -> u32 {
    1
}

fn default_activation_retry_delay_ms() -> u64 {
    2_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5678".to_string(),
            api_key: String::new(),
            auth: EngineAuth::default(),
            timeout_ms: default_engine_timeout_ms(),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: default_step_timeout_ms(),
            activation_retries: default_activation_retries(),
            activation_retry_delay_ms: default_activation_retry_delay_ms(),
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl DeployConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn activation_retry_delay(&self) -> Duration {
        Duration::from_millis(self.activation_retry_delay_ms)
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref())
            .map_err(|err| ProvisionError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), err)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        if config.engine.base_url.trim().is_empty() {
            return Err(ProvisionError::Config("engine.base_url must not be empty".to_string()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use crate::{Config, CredentialKind, EngineAuth};

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
        [engine]
        base_url = "https://n8n.example.com"
        api_key = "secret"
        auth = "bearer"

        [deploy]
        activation_retries = 2
        activation_retry_delay_ms = 500

        [normalizer]
        flat_payload_kinds = ["smtp"]

        [templates]
        dir = "/var/lib/templates"
        "#;
        let config = Config::load_from_str(toml_str).unwrap();
        assert_eq!(config.engine.base_url, "https://n8n.example.com");
        assert_eq!(config.engine.auth, EngineAuth::Bearer);
        assert_eq!(config.engine.timeout_ms, 15_000);
        assert_eq!(config.deploy.activation_retries, 2);
        assert_eq!(config.deploy.activation_retry_delay_ms, 500);
        assert_eq!(config.deploy.step_timeout_ms, 30_000);
        assert_eq!(config.normalizer.flat_payload_kinds, vec![CredentialKind::Smtp]);
        assert_eq!(config.templates.dir.unwrap().to_str().unwrap(), "/var/lib/templates");
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::load_from_str("[engine]\nbase_url = \"http://localhost:5678\"").unwrap();
        assert_eq!(config.engine.auth, EngineAuth::ApiKey);
        assert_eq!(config.deploy.activation_retries, 1);
        assert!(config.normalizer.flat_payload_kinds.is_empty());
        assert!(config.templates.dir.is_none());
    }

    #[test]
    fn test_config_rejects_empty_base_url() {
        assert!(Config::load_from_str("[engine]\nbase_url = \"  \"").is_err());
        assert!(Config::load_from_str("[deploy]\nactivation_retries = 1").is_err());
    }
}
