//! Deployment orchestrator.
//!
//! Runs one deploy request as a strictly sequential chain:
//! `Analyzing -> Materializing -> Injecting -> Upserting -> Activating -> Done`.
//! Every engine call is bounded by the step timeout. Credentials created
//! before a failure stay on the engine and are reported in the result.

mod retry;

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::{
    DeployConfig, ProvisionError, Result,
    analyzer::{CredentialSlot, analyze},
    client::EngineClient,
    form::{FormSection, build_form},
    injector::inject,
    materializer::{Materializer, with_timeout},
    model::{DeployRequest, DeployResponse, DeployStep, DeploymentResult, MaterializedCredential, WorkflowTemplate},
    normalizer::{NormalizedCredentialPayload, Normalizer},
    registry::Registry,
    store::TemplateStore,
};

pub use retry::{RetryPolicy, Sleeper, TokioSleeper};

/// Name of the deployed copy of a template for one user. The template id is
/// part of it so templates sharing a display name never collide on upsert.
pub fn workflow_name(
    template_name: &str,
    template_id: &str,
    user_id: &str,
) -> String {
    format!("{} [{}] ({})", template_name, template_id, user_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployOptions {
    pub step_timeout: Duration,
    pub activation: RetryPolicy,
}

impl Default for DeployOptions {
    fn default() -> Self {
        DeployOptions::from(&DeployConfig::default())
    }
}

impl From<&DeployConfig> for DeployOptions {
    fn from(config: &DeployConfig) -> Self {
        Self {
            step_timeout: config.step_timeout(),
            activation: RetryPolicy::from(config),
        }
    }
}

/// Output of the side-effect free part of a deploy.
struct Prepared {
    template: WorkflowTemplate,
    slots: Vec<CredentialSlot>,
    form: Vec<FormSection>,
    payloads: Vec<NormalizedCredentialPayload>,
}

pub struct Deployer {
    engine: Arc<dyn EngineClient>,
    templates: Arc<dyn TemplateStore>,
    registry: Registry,
    normalizer: Normalizer,
    materializer: Materializer,
    options: DeployOptions,
    sleeper: Arc<dyn Sleeper>,
}

impl Deployer {
    pub fn new(
        engine: Arc<dyn EngineClient>,
        templates: Arc<dyn TemplateStore>,
        registry: Registry,
        normalizer: Normalizer,
        options: DeployOptions,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let materializer = Materializer::new(engine.clone(), options.step_timeout);
        Self {
            engine,
            templates,
            registry,
            normalizer,
            materializer,
            options,
            sleeper,
        }
    }

    pub fn options(&self) -> &DeployOptions {
        &self.options
    }

    /// Form sections a template needs, without touching the engine.
    pub async fn form(
        &self,
        template_id: &str,
    ) -> Result<Vec<FormSection>> {
        let template = with_timeout("get_template", self.options.step_timeout, self.templates.get_template(template_id)).await?;
        let slots = analyze(&template, &self.registry)?;
        Ok(build_form(&slots))
    }

    /// Deploys a template for a user. Never fails as a call: every outcome,
    /// partial ones included, is described by the returned result.
    pub async fn deploy(
        &self,
        request: &DeployRequest,
    ) -> DeployResponse {
        let mut result = DeploymentResult::new(&request.template_id, &request.user_id);
        info!("deploy {} for {}: start", request.template_id, request.user_id);

        let Prepared {
            template,
            slots,
            form,
            payloads,
        } = match self.prepare(request).await {
            Ok(prepared) => prepared,
            Err((form, err)) => return self.failed(result, DeployStep::Analyzing, err, form),
        };
        for payload in payloads.iter() {
            result.warnings.extend(payload.warnings().iter().cloned());
        }
        self.advance(&mut result);

        // materializing, one slot at a time
        for payload in payloads.iter() {
            match self.materializer.materialize(payload, &request.user_id).await {
                Ok(credential) => result.push_credential(credential),
                Err(err) => return self.failed(result, DeployStep::Materializing, err, form),
            }
        }
        self.advance(&mut result);

        let credentials: HashMap<String, MaterializedCredential> = result.credentials.iter().map(|c| (c.slot_key.clone(), c.clone())).collect();
        let mut patched = match inject(&template, &slots, &credentials) {
            Ok(patched) => patched,
            Err(err) => return self.failed(result, DeployStep::Injecting, err, form),
        };
        patched.name = workflow_name(&template.name, &request.template_id, &request.user_id);
        self.advance(&mut result);

        let upserted = match with_timeout("upsert_workflow", self.options.step_timeout, self.engine.create_or_update_workflow(&patched)).await {
            Ok(outcome) => outcome,
            Err(err) => return self.failed(result, DeployStep::Upserting, err, form),
        };
        info!(
            "deploy {} for {}: {} workflow {}",
            request.template_id,
            request.user_id,
            if upserted.created { "created" } else { "updated" },
            upserted.workflow.id
        );
        let workflow_id = upserted.workflow.id;
        result.workflow_id = Some(workflow_id.clone());
        self.advance(&mut result);

        match self.activate(&workflow_id).await {
            Ok(()) => result.activated = true,
            Err(err @ ProvisionError::Timeout { .. }) => return self.failed(result, DeployStep::Activating, err, form),
            Err(err) => {
                warn!("deploy {} for {}: workflow {} left inactive: {}", request.template_id, request.user_id, workflow_id, err);
                result.activation_error = Some(ProvisionError::Activation {
                    workflow_id: workflow_id.clone(),
                    message: match err {
                        ProvisionError::Engine { message, .. } => message,
                        other => other.to_string(),
                    },
                });
            }
        }

        let result = result.finish();
        info!("deploy {} for {}: done (activated: {})", request.template_id, request.user_id, result.activated);
        DeployResponse {
            result,
            form,
        }
    }

    /// Loads, analyzes and normalizes. Nothing here mutates the engine, so a
    /// failure leaves it untouched. The form is returned along with the error
    /// once the template could be analyzed.
    async fn prepare(
        &self,
        request: &DeployRequest,
    ) -> std::result::Result<Prepared, (Vec<FormSection>, ProvisionError)> {
        let template = with_timeout("get_template", self.options.step_timeout, self.templates.get_template(&request.template_id))
            .await
            .map_err(|err| (vec![], err))?;
        let slots = analyze(&template, &self.registry).map_err(|err| (vec![], err))?;
        let form = build_form(&slots);
        debug!("deploy {}: {} credential slots", request.template_id, slots.len());

        let payloads = match self.normalizer.normalize_all(&slots, &request.values) {
            Ok(payloads) => payloads,
            Err(err) => return Err((form, err)),
        };

        Ok(Prepared {
            template,
            slots,
            form,
            payloads,
        })
    }

    /// Activates the workflow under the retry policy, deactivating before
    /// every retry. Deactivation errors are ignored. Timeouts are not retried.
    async fn activate(
        &self,
        workflow_id: &str,
    ) -> Result<()> {
        let timeout = self.options.step_timeout;
        let engine = self.engine.as_ref();

        self.options
            .activation
            .run(
                self.sleeper.as_ref(),
                move || with_timeout("activate_workflow", timeout, engine.activate_workflow(workflow_id)).boxed(),
                move || {
                    async move {
                        if let Err(err) = with_timeout("deactivate_workflow", timeout, engine.deactivate_workflow(workflow_id)).await {
                            debug!("deactivate {} before retry failed: {}", workflow_id, err);
                        }
                    }
                    .boxed()
                },
                |err| !matches!(err, ProvisionError::Timeout { .. }),
            )
            .await
    }

    fn advance(
        &self,
        result: &mut DeploymentResult,
    ) {
        let next = result.state.next();
        debug!("deploy {} for {}: {:?} -> {:?}", result.template_id, result.user_id, result.state, next);
        result.state = next;
    }

    fn failed(
        &self,
        result: DeploymentResult,
        step: DeployStep,
        err: ProvisionError,
        form: Vec<FormSection>,
    ) -> DeployResponse {
        warn!("deploy {} for {}: failed in {}: {}", result.template_id, result.user_id, step.as_ref(), err);
        if !result.created_credential_ids.is_empty() {
            warn!("deploy {} for {}: keeping created credentials {:?}", result.template_id, result.user_id, result.created_credential_ids);
        }
        DeployResponse {
            result: result.fail(step, err),
            form,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{client::MemEngineClient, model::DeployState, store::MemTemplateStore};

    fn deployer(engine: Arc<MemEngineClient>) -> Deployer {
        let templates = MemTemplateStore::new();
        templates.insert(
            "summarizer",
            WorkflowTemplate::from_value(json!({
                "name": "Summarizer",
                "nodes": [
                    { "id": "t", "name": "Trigger", "type": "n8n-nodes-base.manualTrigger" },
                    { "id": "llm", "name": "OpenAI", "type": "@n8n/n8n-nodes-langchain.lmChatOpenAi" }
                ]
            }))
            .unwrap(),
        );
        let options = DeployOptions {
            step_timeout: Duration::from_secs(5),
            activation: RetryPolicy::new(1, Duration::ZERO),
        };
        Deployer::new(engine, Arc::new(templates), Registry::with_defaults(), Normalizer::default(), options, Arc::new(TokioSleeper))
    }

    #[test]
    fn test_workflow_name() {
        assert_eq!(workflow_name("Summarizer", "summarizer", "u1"), "Summarizer [summarizer] (u1)");
        assert_ne!(workflow_name("My workflow", "a", "u1"), workflow_name("My workflow", "b", "u1"));
    }

    #[test]
    fn test_options_from_config() {
        let options = DeployOptions::default();
        assert_eq!(options.step_timeout, Duration::from_secs(30));
        assert_eq!(options.activation, RetryPolicy::new(1, Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_form_has_no_side_effects() {
        let engine = Arc::new(MemEngineClient::new());
        let form = deployer(engine.clone()).form("summarizer").await.unwrap();
        assert_eq!(form.len(), 1);
        assert_eq!(form[0].slot_keys, vec!["llm-openai".to_string()]);
        assert_eq!(engine.calls(), Default::default());
    }

    #[tokio::test]
    async fn test_deploy_token_credential() {
        let engine = Arc::new(MemEngineClient::new());
        let deployer = deployer(engine.clone());

        let response = deployer.deploy(&DeployRequest::new("summarizer", "u1").with("llm-openai.apiKey", "sk-test")).await;
        let result = response.result;
        assert!(result.is_done(), "{:?}", result.error);
        assert!(result.activated);
        assert_eq!(result.created_credential_ids.len(), 1);

        let workflows = engine.workflows();
        assert_eq!(workflows.len(), 1);
        assert_eq!(workflows[0].name, "Summarizer [summarizer] (u1)");
        let doc = engine.workflow_doc(&workflows[0].id).unwrap();
        assert_eq!(doc.node("llm").unwrap().credentials.as_ref().unwrap()["openAiApi"]["id"], json!(result.created_credential_ids[0]));
    }

    #[tokio::test]
    async fn test_unknown_template_fails_before_mutation() {
        let engine = Arc::new(MemEngineClient::new());
        let response = deployer(engine.clone()).deploy(&DeployRequest::new("missing", "u1")).await;

        assert_eq!(response.result.state, DeployState::Failed(DeployStep::Analyzing));
        assert_eq!(response.result.error, Some(ProvisionError::TemplateNotFound("missing".to_string())));
        assert!(response.form.is_empty());
        assert_eq!(engine.calls(), Default::default());
    }
}
