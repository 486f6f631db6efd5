use std::sync::Arc;

use crate::{
    Config, ProvisionError, Result,
    client::{EngineClient, HttpEngineClient},
    deployer::{DeployOptions, Deployer, Sleeper, TokioSleeper},
    normalizer::Normalizer,
    registry::Registry,
    store::{FsTemplateStore, TemplateStore},
};

/// Assembles a [`Deployer`] from a [`Config`].
///
/// Anything not injected is built from the config: an HTTP engine client
/// from `engine`, a file template store from `templates.dir`, the default
/// registry and a tokio sleeper.
pub struct DeployerBuilder {
    config: Config,
    engine: Option<Arc<dyn EngineClient>>,
    templates: Option<Arc<dyn TemplateStore>>,
    registry: Option<Registry>,
    sleeper: Option<Arc<dyn Sleeper>>,
}

impl Default for DeployerBuilder {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl DeployerBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            engine: None,
            templates: None,
            registry: None,
            sleeper: None,
        }
    }

    pub fn engine(
        mut self,
        engine: Arc<dyn EngineClient>,
    ) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn templates(
        mut self,
        templates: Arc<dyn TemplateStore>,
    ) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn registry(
        mut self,
        registry: Registry,
    ) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn sleeper(
        mut self,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    pub fn build(self) -> Result<Deployer> {
        let engine: Arc<dyn EngineClient> = match self.engine {
            Some(engine) => engine,
            None => Arc::new(HttpEngineClient::new(&self.config.engine)?),
        };
        let templates: Arc<dyn TemplateStore> = match (self.templates, &self.config.templates.dir) {
            (Some(templates), _) => templates,
            (None, Some(dir)) => Arc::new(FsTemplateStore::new(dir)),
            (None, None) => return Err(ProvisionError::Config("templates.dir is required when no template store is provided".to_string())),
        };

        Ok(Deployer::new(
            engine,
            templates,
            self.registry.unwrap_or_else(Registry::with_defaults),
            Normalizer::new(&self.config.normalizer.flat_payload_kinds),
            DeployOptions::from(&self.config.deploy),
            self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper)),
        ))
    }
}
