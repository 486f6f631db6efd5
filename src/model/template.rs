use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{ProvisionError, Result};

/// A workflow node-graph document as stored by the template store.
///
/// Only the fields the deploy pipeline reads are typed; anything else
/// (`pinData`, `meta`, `tags`, ...) is carried through `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub name: String,
    pub nodes: Vec<NodeModel>,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub connections: JsonValue,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub settings: JsonValue,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeModel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub parameters: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Map<String, JsonValue>>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl WorkflowTemplate {
    pub fn from_json(s: &str) -> Result<Self> {
        let value = serde_json::from_str::<JsonValue>(s)?;
        Self::from_value(value)
    }

    pub fn from_value(value: JsonValue) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &value)?;
        serde_json::from_value::<WorkflowTemplate>(value).map_err(|e| ProvisionError::Convert(format!("{}", e)))
    }

    pub fn schema() -> JsonValue {
        serde_json::json!({
            "type": "object",
            "required": ["name", "nodes"],
            "properties": {
                "name": { "type": "string" },
                "nodes": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["id", "name", "type"],
                        "properties": {
                            "id": { "type": "string", "minLength": 1 },
                            "name": { "type": "string" },
                            "type": { "type": "string", "minLength": 1 },
                            "parameters": { "type": "object" },
                            "credentials": { "type": "object" }
                        }
                    }
                },
                "connections": { "type": "object" },
                "settings": { "type": "object" }
            }
        })
    }

    /// get node by id
    pub fn node(
        &self,
        id: &str,
    ) -> Option<&NodeModel> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub(crate) fn node_mut(
        &mut self,
        id: &str,
    ) -> Option<&mut NodeModel> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }
}

impl NodeModel {
    /// Reads a string parameter, e.g. `genericAuthType`.
    pub fn parameter_str(
        &self,
        key: &str,
    ) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }
}
