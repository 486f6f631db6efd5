use serde::{Deserialize, Serialize};

use crate::registry::{CredentialKind, SlotKey};

/// Credential reference as it appears under `node.credentials[<type>]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRef {
    pub id: String,
    pub name: String,
}

/// A credential that exists on the engine, either created or found by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedCredential {
    pub id: String,
    pub name: String,
    pub kind: CredentialKind,
    pub slot_key: SlotKey,
    /// false when an existing credential was reused
    pub created: bool,
}

impl MaterializedCredential {
    pub fn reference(&self) -> CredentialRef {
        CredentialRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}
