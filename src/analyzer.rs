//! Requirement analyzer.
//!
//! Walks a template's nodes once and produces the deduplicated list of
//! credential slots the template needs, in first-appearance order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    ProvisionError, Result,
    model::WorkflowTemplate,
    registry::{CredentialKind, FieldSpec, Registry, SlotKey},
};

/// A node that consumes a slot's credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub node_id: String,
    pub node_name: String,
}

/// Host derivation rule between the two halves of a mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedSlot {
    /// slot whose values may fill gaps in this one
    pub sibling: SlotKey,
    /// host prefix of the sibling, e.g. `imap`
    pub from_prefix: &'static str,
    /// host prefix of this slot, e.g. `smtp`
    pub to_prefix: &'static str,
}

/// One credential requirement, possibly shared by several nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialSlot {
    slot_key: SlotKey,
    kind: CredentialKind,
    field_schema: Vec<FieldSpec>,
    node_refs: Vec<NodeRef>,
    paired: Option<PairedSlot>,
}

impl CredentialSlot {
    fn new(kind: CredentialKind) -> Self {
        Self {
            slot_key: kind.slot_key(),
            kind,
            field_schema: kind.fields(),
            node_refs: vec![],
            paired: None,
        }
    }

    pub fn slot_key(&self) -> &str {
        &self.slot_key
    }

    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    pub fn field_schema(&self) -> &[FieldSpec] {
        &self.field_schema
    }

    pub fn node_refs(&self) -> &[NodeRef] {
        &self.node_refs
    }

    pub fn paired(&self) -> Option<&PairedSlot> {
        self.paired.as_ref()
    }
}

/// Produces the credential slots a template needs.
///
/// Fails with [`ProvisionError::Analysis`] on the first node whose type the
/// registry does not know. Pure: the template is only read.
pub fn analyze(
    template: &WorkflowTemplate,
    registry: &Registry,
) -> Result<Vec<CredentialSlot>> {
    let mut slots: Vec<CredentialSlot> = vec![];
    let mut index: HashMap<SlotKey, usize> = HashMap::new();

    for node in &template.nodes {
        let kinds = registry.lookup(node).map_err(|err| ProvisionError::Analysis {
            node_id: node.id.clone(),
            reason: err.to_string(),
        })?;

        for kind in kinds {
            let slot_key = kind.slot_key();
            let position = match index.get(&slot_key) {
                Some(position) => *position,
                None => {
                    slots.push(CredentialSlot::new(kind));
                    index.insert(slot_key, slots.len() - 1);
                    slots.len() - 1
                }
            };

            let slot = &mut slots[position];
            if !slot.node_refs.iter().any(|r| r.node_id == node.id) {
                slot.node_refs.push(NodeRef {
                    node_id: node.id.clone(),
                    node_name: node.name.clone(),
                });
            }
        }
    }

    pair_slots(&mut slots, &index);
    debug!("analyze({}) -> {} slot(s)", template.name, slots.len());

    Ok(slots)
}

/// Links slots whose kinds are siblings and both present.
fn pair_slots(
    slots: &mut [CredentialSlot],
    index: &HashMap<SlotKey, usize>,
) {
    for slot in slots.iter_mut() {
        let Some(sibling) = slot.kind.sibling() else {
            continue;
        };
        let sibling_key = sibling.slot_key();
        if !index.contains_key(&sibling_key) {
            continue;
        }
        if let (Some(from_prefix), Some(to_prefix)) = (sibling.service_prefix(), slot.kind.service_prefix()) {
            slot.paired = Some(PairedSlot {
                sibling: sibling_key,
                from_prefix,
                to_prefix,
            });
        }
    }
}
