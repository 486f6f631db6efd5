//! Workflow injector.
//!
//! Produces a patched clone of a template in which every node referenced by
//! a slot points at the slot's materialized credential. Only the
//! `credentials` entry for the slot's kind changes; the input is never mutated.

use std::collections::HashMap;

use serde_json::Map;
use tracing::trace;

use crate::{
    ProvisionError, Result,
    analyzer::CredentialSlot,
    model::{MaterializedCredential, WorkflowTemplate},
};

pub fn inject(
    template: &WorkflowTemplate,
    slots: &[CredentialSlot],
    credentials: &HashMap<String, MaterializedCredential>,
) -> Result<WorkflowTemplate> {
    let mut patched = template.clone();

    for slot in slots {
        let credential = credentials.get(slot.slot_key()).ok_or_else(|| ProvisionError::Injection {
            node_id: slot.node_refs().first().map(|r| r.node_id.clone()).unwrap_or_default(),
            reason: format!("no credential materialized for slot '{}'", slot.slot_key()),
        })?;
        let reference = serde_json::to_value(credential.reference())?;

        for node_ref in slot.node_refs() {
            let node = patched.node_mut(&node_ref.node_id).ok_or_else(|| ProvisionError::Injection {
                node_id: node_ref.node_id.clone(),
                reason: "node is no longer present in the template".to_string(),
            })?;
            trace!("inject: {} -> {} ({})", node.id, credential.id, slot.kind().engine_type());
            node.credentials.get_or_insert_with(Map::new).insert(slot.kind().engine_type().to_string(), reference.clone());
        }
    }

    Ok(patched)
}
