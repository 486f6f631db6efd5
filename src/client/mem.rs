//! In-memory engine for tests and dry runs.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::trace;

use crate::{
    ProvisionError, Result,
    client::{CredentialHandle, EngineClient, WorkflowHandle},
    model::WorkflowTemplate,
};

/// Number of calls received per operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub find_credential: usize,
    pub create_credential: usize,
    pub find_workflow: usize,
    pub create_workflow: usize,
    pub update_workflow: usize,
    pub activate: usize,
    pub deactivate: usize,
}

#[derive(Debug, Default)]
struct MemState {
    credentials: Vec<(CredentialHandle, JsonValue)>,
    workflows: Vec<(WorkflowHandle, WorkflowTemplate)>,
    next_id: u64,
    calls: CallCounts,
    rejected_types: Vec<String>,
    activation_failures: u32,
    latency: Option<Duration>,
    op_latency: HashMap<String, Duration>,
}

impl MemState {
    fn next_id(
        &mut self,
        prefix: &str,
    ) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn workflow_mut(
        &mut self,
        id: &str,
    ) -> Result<&mut (WorkflowHandle, WorkflowTemplate)> {
        self.workflows.iter_mut().find(|(w, _)| w.id == id).ok_or_else(|| ProvisionError::Engine {
            status: Some(404),
            message: format!("workflow {} not found", id),
        })
    }
}

/// An engine that keeps credentials and workflows in memory.
///
/// Supports failure injection so callers can exercise partial-failure and
/// activation-retry paths without a real engine.
#[derive(Debug, Default)]
pub struct MemEngineClient {
    state: Mutex<MemState>,
}

impl MemEngineClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes the engine reject credential bodies of this type.
    pub fn reject_credential_type(
        &self,
        credential_type: &str,
    ) {
        self.state().rejected_types.push(credential_type.to_string());
    }

    /// Makes the next `n` activation calls fail.
    pub fn fail_next_activations(
        &self,
        n: u32,
    ) {
        self.state().activation_failures = n;
    }

    /// Delays every call, used to exercise step timeouts.
    pub fn set_latency(
        &self,
        latency: Duration,
    ) {
        self.state().latency = Some(latency);
    }

    /// Delays one operation only, named like the [`CallCounts`] field,
    /// e.g. `activate` or `find_workflow`. Overrides [`Self::set_latency`].
    pub fn set_latency_for(
        &self,
        op: &str,
        latency: Duration,
    ) {
        self.state().op_latency.insert(op.to_string(), latency);
    }

    /// Adds a credential as if it had been created earlier.
    pub fn seed_credential(
        &self,
        name: &str,
        credential_type: &str,
    ) -> CredentialHandle {
        let mut state = self.state();
        let handle = CredentialHandle {
            id: state.next_id("cred"),
            name: name.to_string(),
            credential_type: credential_type.to_string(),
        };
        state.credentials.push((handle.clone(), JsonValue::Null));
        handle
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls.clone()
    }

    pub fn credentials(&self) -> Vec<CredentialHandle> {
        self.state().credentials.iter().map(|(h, _)| h.clone()).collect()
    }

    /// The body a credential was created with.
    pub fn credential_body(
        &self,
        id: &str,
    ) -> Option<JsonValue> {
        self.state().credentials.iter().find(|(h, _)| h.id == id).map(|(_, body)| body.clone())
    }

    pub fn workflows(&self) -> Vec<WorkflowHandle> {
        self.state().workflows.iter().map(|(w, _)| w.clone()).collect()
    }

    /// The document a workflow was last stored with.
    pub fn workflow_doc(
        &self,
        id: &str,
    ) -> Option<WorkflowTemplate> {
        self.state().workflows.iter().find(|(w, _)| w.id == id).map(|(_, doc)| doc.clone())
    }

    /// Counts the call, then sleeps whatever latency applies to `op`. The
    /// count is taken first so a call cut short by a timeout still shows up.
    async fn enter(
        &self,
        op: &str,
        count: impl FnOnce(&mut CallCounts),
    ) {
        let latency = {
            let mut state = self.state();
            count(&mut state.calls);
            state.op_latency.get(op).copied().or(state.latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl EngineClient for MemEngineClient {
    async fn find_credential(
        &self,
        name: &str,
    ) -> Result<Option<CredentialHandle>> {
        self.enter("find_credential", |c| c.find_credential += 1).await;
        let mut state = self.state();
        Ok(state.credentials.iter().find(|(h, _)| h.name == name).map(|(h, _)| h.clone()))
    }

    async fn create_credential(
        &self,
        body: &JsonValue,
    ) -> Result<CredentialHandle> {
        self.enter("create_credential", |c| c.create_credential += 1).await;
        let mut state = self.state();

        let credential_type = body.get("type").and_then(|t| t.as_str()).unwrap_or_default().to_string();
        let name = body.get("name").and_then(|n| n.as_str()).unwrap_or_default().to_string();
        if name.is_empty() || credential_type.is_empty() || state.rejected_types.contains(&credential_type) {
            return Err(ProvisionError::Engine {
                status: Some(400),
                message: format!("credential type '{}' rejected", credential_type),
            });
        }

        let handle = CredentialHandle {
            id: state.next_id("cred"),
            name,
            credential_type,
        };
        trace!("mem engine: created credential {} ({})", handle.id, handle.name);
        state.credentials.push((handle.clone(), body.clone()));
        Ok(handle)
    }

    async fn find_workflow(
        &self,
        name: &str,
    ) -> Result<Option<WorkflowHandle>> {
        self.enter("find_workflow", |c| c.find_workflow += 1).await;
        let mut state = self.state();
        Ok(state.workflows.iter().find(|(w, _)| w.name == name).map(|(w, _)| w.clone()))
    }

    async fn create_workflow(
        &self,
        doc: &WorkflowTemplate,
    ) -> Result<WorkflowHandle> {
        self.enter("create_workflow", |c| c.create_workflow += 1).await;
        let mut state = self.state();
        let handle = WorkflowHandle {
            id: state.next_id("wf"),
            name: doc.name.clone(),
            active: false,
        };
        state.workflows.push((handle.clone(), doc.clone()));
        Ok(handle)
    }

    async fn update_workflow(
        &self,
        id: &str,
        doc: &WorkflowTemplate,
    ) -> Result<WorkflowHandle> {
        self.enter("update_workflow", |c| c.update_workflow += 1).await;
        let mut state = self.state();
        let entry = state.workflow_mut(id)?;
        entry.0.name = doc.name.clone();
        entry.1 = doc.clone();
        Ok(entry.0.clone())
    }

    async fn activate_workflow(
        &self,
        id: &str,
    ) -> Result<()> {
        self.enter("activate", |c| c.activate += 1).await;
        let mut state = self.state();
        if state.activation_failures > 0 {
            state.activation_failures -= 1;
            return Err(ProvisionError::Engine {
                status: Some(400),
                message: "There is a conflict with one of the webhooks.".to_string(),
            });
        }
        state.workflow_mut(id)?.0.active = true;
        Ok(())
    }

    async fn deactivate_workflow(
        &self,
        id: &str,
    ) -> Result<()> {
        self.enter("deactivate", |c| c.deactivate += 1).await;
        let mut state = self.state();
        state.workflow_mut(id)?.0.active = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_credentials_are_found_by_name() {
        let engine = MemEngineClient::new();
        let created = engine.create_credential(&json!({ "name": "IMAP (u1)", "type": "imap", "data": {} })).await.unwrap();
        let found = engine.find_credential("IMAP (u1)").await.unwrap().unwrap();
        assert_eq!(created, found);
        assert!(engine.find_credential("IMAP (u2)").await.unwrap().is_none());
        assert_eq!(engine.calls().create_credential, 1);
        assert_eq!(engine.calls().find_credential, 2);
    }

    #[tokio::test]
    async fn test_rejected_type() {
        let engine = MemEngineClient::new();
        engine.reject_credential_type("smtp");
        let err = engine.create_credential(&json!({ "name": "SMTP (u1)", "type": "smtp" })).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Engine { status: Some(400), .. }));
        assert!(engine.credentials().is_empty());
    }

    #[tokio::test]
    async fn test_activation_failures_are_consumed() {
        let engine = MemEngineClient::new();
        let doc = WorkflowTemplate::from_value(json!({ "name": "w", "nodes": [] })).unwrap();
        let wf = engine.create_workflow(&doc).await.unwrap();

        engine.fail_next_activations(1);
        assert!(engine.activate_workflow(&wf.id).await.is_err());
        engine.activate_workflow(&wf.id).await.unwrap();
        assert!(engine.workflows()[0].active);

        engine.deactivate_workflow(&wf.id).await.unwrap();
        assert!(!engine.workflows()[0].active);
        assert!(engine.activate_workflow("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_latency_for_one_operation() {
        let engine = MemEngineClient::new();
        engine.set_latency_for("find_workflow", Duration::from_millis(200));

        let lookup = tokio::time::timeout(Duration::from_millis(20), engine.find_workflow("w"));
        assert!(lookup.await.is_err());
        let credential = tokio::time::timeout(Duration::from_millis(100), engine.find_credential("IMAP (u1)"));
        assert!(credential.await.unwrap().unwrap().is_none());
        assert_eq!(engine.calls().find_workflow, 1);
        assert_eq!(engine.calls().find_credential, 1);
    }
}
