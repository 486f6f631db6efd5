//! Engine client boundary.
//!
//! A thin typed view of the orchestration engine's REST surface. No business
//! logic lives behind this trait: the pipeline decides what to send, the
//! client only moves it over the wire.

mod http;
mod mem;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::debug;

use crate::{Result, model::WorkflowTemplate};

pub use http::HttpEngineClient;
pub use mem::{CallCounts, MemEngineClient};

/// Credential as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialHandle {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub credential_type: String,
}

/// Workflow as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowHandle {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
}

/// Result of a create-or-update call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub workflow: WorkflowHandle,
    pub created: bool,
}

/// Engine ids are strings on recent versions and numbers on older ones.
fn id_from_any<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => Ok(s),
        JsonValue::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unexpected id {}", other))),
    }
}

/// The workflow body the engine accepts on create and update.
///
/// The engine rejects read-only properties, so only these four are sent.
pub fn workflow_body(doc: &WorkflowTemplate) -> JsonValue {
    let or_empty = |v: &JsonValue| if v.is_null() { json!({}) } else { v.clone() };
    json!({
        "name": doc.name,
        "nodes": doc.nodes,
        "connections": or_empty(&doc.connections),
        "settings": or_empty(&doc.settings),
    })
}

#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Looks a credential up by its exact name.
    async fn find_credential(
        &self,
        name: &str,
    ) -> Result<Option<CredentialHandle>>;

    /// Creates a credential from a fully shaped body (`name`, `type`, fields).
    async fn create_credential(
        &self,
        body: &JsonValue,
    ) -> Result<CredentialHandle>;

    /// Looks a workflow up by its exact name.
    async fn find_workflow(
        &self,
        name: &str,
    ) -> Result<Option<WorkflowHandle>>;

    async fn create_workflow(
        &self,
        doc: &WorkflowTemplate,
    ) -> Result<WorkflowHandle>;

    async fn update_workflow(
        &self,
        id: &str,
        doc: &WorkflowTemplate,
    ) -> Result<WorkflowHandle>;

    async fn activate_workflow(
        &self,
        id: &str,
    ) -> Result<()>;

    async fn deactivate_workflow(
        &self,
        id: &str,
    ) -> Result<()>;

    /// Creates the workflow if no workflow with its name exists, otherwise
    /// updates the existing one in place.
    async fn create_or_update_workflow(
        &self,
        doc: &WorkflowTemplate,
    ) -> Result<UpsertOutcome> {
        match self.find_workflow(&doc.name).await? {
            Some(existing) => {
                debug!("engine: updating workflow {} ({})", existing.id, doc.name);
                let workflow = self.update_workflow(&existing.id, doc).await?;
                Ok(UpsertOutcome {
                    workflow,
                    created: false,
                })
            }
            None => {
                debug!("engine: creating workflow {}", doc.name);
                let workflow = self.create_workflow(doc).await?;
                Ok(UpsertOutcome {
                    workflow,
                    created: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_accept_numeric_ids() {
        let handle: CredentialHandle = serde_json::from_value(json!({ "id": 42, "name": "SMTP (u1)", "type": "smtp" })).unwrap();
        assert_eq!(handle.id, "42");
        let handle: WorkflowHandle = serde_json::from_value(json!({ "id": "wf1", "name": "w" })).unwrap();
        assert!(!handle.active);
    }

    #[test]
    fn test_workflow_body_strips_extra_fields() {
        let doc = WorkflowTemplate::from_value(json!({
            "name": "w",
            "nodes": [],
            "active": true,
            "tags": ["x"],
            "pinData": {}
        }))
        .unwrap();
        let body = workflow_body(&doc);
        assert_eq!(body, json!({ "name": "w", "nodes": [], "connections": {}, "settings": {} }));
    }
}
