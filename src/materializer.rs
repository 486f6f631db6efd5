//! Credential materializer: idempotent get-or-create of one engine credential per slot.
//!
//! Two concurrent deploys for the same user and slot may both miss the lookup
//! and both create a credential. That race is accepted: the engine stays the
//! source of truth and the next deploy resolves to whichever one it finds first.

use std::{future::Future, sync::Arc, time::Duration};

use tracing::{debug, info};

use crate::{
    ProvisionError, Result,
    client::EngineClient,
    model::MaterializedCredential,
    normalizer::NormalizedCredentialPayload,
    registry::CredentialKind,
};

/// Deterministic credential name for a kind and user, `IMAP (user-42)`.
pub fn credential_name(
    kind: CredentialKind,
    user_id: &str,
) -> String {
    format!("{} ({})", kind.display_name(), user_id)
}

/// Awaits an engine call, turning an overrun into `Timeout { step }`.
pub(crate) async fn with_timeout<T>(
    step: &str,
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut).await.map_err(|_| ProvisionError::Timeout {
        step: step.to_string(),
    })?
}

pub struct Materializer {
    engine: Arc<dyn EngineClient>,
    step_timeout: Duration,
}

impl Materializer {
    pub fn new(
        engine: Arc<dyn EngineClient>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            step_timeout,
        }
    }

    /// Resolves the slot's credential, creating it only when no credential
    /// with the deterministic name exists. Makes at most one create call.
    pub async fn materialize(
        &self,
        payload: &NormalizedCredentialPayload,
        user_id: &str,
    ) -> Result<MaterializedCredential> {
        let kind = payload.kind();
        let slot_key = payload.slot_key().to_string();
        let name = credential_name(kind, user_id);

        let existing = with_timeout("find_credential", self.step_timeout, self.engine.find_credential(&name)).await?;
        if let Some(handle) = existing {
            debug!("materialize({}): reusing credential {} ({})", slot_key, handle.id, name);
            return Ok(MaterializedCredential {
                id: handle.id,
                name: handle.name,
                kind,
                slot_key,
                created: false,
            });
        }

        let body = payload.engine_body(&name);
        let handle = with_timeout("create_credential", self.step_timeout, self.engine.create_credential(&body)).await.map_err(|err| match err {
            ProvisionError::Engine { status, message } => ProvisionError::CredentialCreation {
                slot_key: slot_key.clone(),
                engine_status: status,
                message,
            },
            other => other,
        })?;
        info!("materialize({}): created credential {} ({})", slot_key, handle.id, name);

        Ok(MaterializedCredential {
            id: handle.id,
            name: handle.name,
            kind,
            slot_key,
            created: true,
        })
    }
}
