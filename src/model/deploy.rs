use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{ProvisionError, form::FormSection, model::MaterializedCredential, normalizer::NormalizeWarning, utils};

/// Note appended to failures that happen after the engine has been mutated.
pub const PARTIAL_STATE_NOTE: &str = "Some integration accounts have already been connected.";

/// Caller-facing deploy request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployRequest {
    pub template_id: String,
    pub user_id: String,
    /// values keyed by `<slot_key>.<field>`, strings or numbers
    #[serde(default)]
    pub values: BTreeMap<String, JsonValue>,
}

impl DeployRequest {
    pub fn new(
        template_id: &str,
        user_id: &str,
    ) -> Self {
        Self {
            template_id: template_id.to_string(),
            user_id: user_id.to_string(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(
        mut self,
        key: &str,
        value: impl Into<JsonValue>,
    ) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }
}

/// Pipeline step a deploy can fail in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeployStep {
    Analyzing,
    Materializing,
    Injecting,
    Upserting,
    Activating,
}

/// Deploy state machine.
///
/// `Analyzing -> Materializing -> Injecting -> Upserting -> Activating -> Done`,
/// with `Failed(step)` reachable from any non-terminal state.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "state", content = "step")]
pub enum DeployState {
    Analyzing,
    Materializing,
    Injecting,
    Upserting,
    Activating,
    Done,
    Failed(DeployStep),
}

impl DeployState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployState::Done | DeployState::Failed(_))
    }

    /// The step a non-terminal state is executing.
    pub fn step(&self) -> Option<DeployStep> {
        match self {
            DeployState::Analyzing => Some(DeployStep::Analyzing),
            DeployState::Materializing => Some(DeployStep::Materializing),
            DeployState::Injecting => Some(DeployStep::Injecting),
            DeployState::Upserting => Some(DeployStep::Upserting),
            DeployState::Activating => Some(DeployStep::Activating),
            DeployState::Done | DeployState::Failed(_) => None,
        }
    }

    /// The state that follows a successful step.
    pub fn next(&self) -> DeployState {
        match self {
            DeployState::Analyzing => DeployState::Materializing,
            DeployState::Materializing => DeployState::Injecting,
            DeployState::Injecting => DeployState::Upserting,
            DeployState::Upserting => DeployState::Activating,
            DeployState::Activating | DeployState::Done => DeployState::Done,
            DeployState::Failed(step) => DeployState::Failed(*step),
        }
    }
}

/// Outcome of one deploy attempt. Returned on partial failure too, since
/// credentials created before the failure are not rolled back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub template_id: String,
    pub user_id: String,
    pub state: DeployState,
    pub workflow_id: Option<String>,
    pub activated: bool,
    pub failed_step: Option<DeployStep>,
    pub error: Option<ProvisionError>,
    pub activation_error: Option<ProvisionError>,
    /// ids of credentials created by this attempt
    pub created_credential_ids: Vec<String>,
    /// every credential the workflow was wired to, created or reused
    pub credentials: Vec<MaterializedCredential>,
    pub warnings: Vec<NormalizeWarning>,
    pub started_at: i64,
    pub finished_at: i64,
}

impl DeploymentResult {
    pub fn new(
        template_id: &str,
        user_id: &str,
    ) -> Self {
        Self {
            template_id: template_id.to_string(),
            user_id: user_id.to_string(),
            state: DeployState::Analyzing,
            workflow_id: None,
            activated: false,
            failed_step: None,
            error: None,
            activation_error: None,
            created_credential_ids: vec![],
            credentials: vec![],
            warnings: vec![],
            started_at: utils::time::time_millis(),
            finished_at: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == DeployState::Done
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, DeployState::Failed(_))
    }

    /// Records a materialized credential.
    pub fn push_credential(
        &mut self,
        credential: MaterializedCredential,
    ) {
        if credential.created {
            self.created_credential_ids.push(credential.id.clone());
        }
        self.credentials.push(credential);
    }

    pub(crate) fn fail(
        mut self,
        step: DeployStep,
        error: ProvisionError,
    ) -> Self {
        self.state = DeployState::Failed(step);
        self.failed_step = Some(step);
        self.error = Some(error);
        self.finished_at = utils::time::time_millis();
        self
    }

    pub(crate) fn finish(mut self) -> Self {
        self.state = DeployState::Done;
        self.finished_at = utils::time::time_millis();
        self
    }

    /// Human readable summary, noting partial engine state after late failures.
    pub fn user_message(&self) -> String {
        match (&self.state, &self.error) {
            (DeployState::Failed(_), Some(error)) => {
                if self.created_credential_ids.is_empty() {
                    error.to_string()
                } else {
                    format!("{} {}", error, PARTIAL_STATE_NOTE)
                }
            }
            (DeployState::Done, _) => match (&self.activation_error, &self.workflow_id) {
                (Some(error), _) => format!("Workflow deployed but inactive: {}", error),
                (None, Some(id)) => format!("Workflow {} deployed and active.", id),
                (None, None) => "Workflow deployed.".to_string(),
            },
            _ => format!("Deploy in progress ({:?}).", self.state),
        }
    }
}

/// Deploy response: the result plus the form sections the template required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployResponse {
    pub result: DeploymentResult,
    pub form: Vec<FormSection>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CredentialKind;

    fn credential(
        id: &str,
        created: bool,
    ) -> MaterializedCredential {
        MaterializedCredential {
            id: id.to_string(),
            name: format!("IMAP ({})", id),
            kind: CredentialKind::Imap,
            slot_key: "mail-inbound".to_string(),
            created,
        }
    }

    #[test]
    fn test_state_sequence() {
        let mut state = DeployState::Analyzing;
        let mut steps = vec![];
        while !state.is_terminal() {
            steps.push(state.step().unwrap());
            state = state.next();
        }
        assert_eq!(
            steps,
            vec![DeployStep::Analyzing, DeployStep::Materializing, DeployStep::Injecting, DeployStep::Upserting, DeployStep::Activating]
        );
        assert_eq!(state, DeployState::Done);
        assert_eq!(DeployState::Failed(DeployStep::Injecting).next(), DeployState::Failed(DeployStep::Injecting));
    }

    #[test]
    fn test_only_created_credentials_are_listed_as_created() {
        let mut result = DeploymentResult::new("t1", "u1");
        result.push_credential(credential("c1", true));
        result.push_credential(credential("c2", false));
        assert_eq!(result.created_credential_ids, vec!["c1".to_string()]);
        assert_eq!(result.credentials.len(), 2);
    }

    #[test]
    fn test_user_message_notes_partial_state() {
        let error = ProvisionError::CredentialCreation {
            slot_key: "mail-outbound".to_string(),
            engine_status: Some(400),
            message: "bad payload".to_string(),
        };

        let untouched = DeploymentResult::new("t1", "u1").fail(DeployStep::Materializing, error.clone());
        assert!(!untouched.user_message().contains(PARTIAL_STATE_NOTE));

        let mut partial = DeploymentResult::new("t1", "u1");
        partial.push_credential(credential("c1", true));
        let partial = partial.fail(DeployStep::Materializing, error);
        assert!(partial.is_failed());
        assert!(partial.user_message().ends_with(PARTIAL_STATE_NOTE));
    }

    #[test]
    fn test_state_serialization() {
        let value = serde_json::to_value(DeployState::Failed(DeployStep::Upserting)).unwrap();
        assert_eq!(value, serde_json::json!({ "state": "failed", "step": "upserting" }));
        let value = serde_json::to_value(DeployState::Done).unwrap();
        assert_eq!(value, serde_json::json!({ "state": "done" }));
    }
}
