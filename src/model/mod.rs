mod credential;
mod deploy;
mod template;

pub use credential::{CredentialRef, MaterializedCredential};
pub use deploy::{DeployRequest, DeployResponse, DeployState, DeployStep, DeploymentResult, PARTIAL_STATE_NOTE};
pub use template::{NodeModel, WorkflowTemplate};
