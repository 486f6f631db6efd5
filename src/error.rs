//! Error types for Flowprov.
//!
//! All errors are represented by the `ProvisionError` enum. Every pipeline
//! variant carries the structured context (slot key, node id, step) a caller
//! needs to render an actionable message.

use std::io::ErrorKind;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Flowprov operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum ProvisionError {
    /// A node declares an integration type the registry does not know.
    #[error("analysis failed at node '{node_id}': {reason}")]
    Analysis {
        node_id: String,
        reason: String,
    },

    /// User supplied a value that cannot be turned into a credential.
    #[error("invalid value for '{slot_key}.{field}': {reason}")]
    Validation {
        slot_key: String,
        field: String,
        reason: String,
    },

    /// The engine rejected a credential payload.
    #[error("credential for slot '{slot_key}' was rejected by the engine (status: {engine_status:?}): {message}")]
    CredentialCreation {
        slot_key: String,
        engine_status: Option<u16>,
        message: String,
    },

    /// The template drifted between analysis and injection.
    #[error("injection failed at node '{node_id}': {reason}")]
    Injection {
        node_id: String,
        reason: String,
    },

    /// The workflow is deployed but could not be activated.
    #[error("workflow '{workflow_id}' could not be activated: {message}")]
    Activation {
        workflow_id: String,
        message: String,
    },

    /// Non-success response from the engine.
    #[error("engine error (status: {status:?}): {message}")]
    Engine {
        status: Option<u16>,
        message: String,
    },

    /// A pipeline step did not settle within the configured timeout.
    #[error("step '{step}' timed out")]
    Timeout {
        step: String,
    },

    /// Template store has no template with this id.
    #[error("template '{0}' not found")]
    TemplateNotFound(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, TOML).
    #[error("{0}")]
    Convert(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),
}

impl ProvisionError {
    /// Returns true when the error was raised before any engine mutation,
    /// so the caller can retry with corrected input without side effects.
    pub fn is_pre_mutation(&self) -> bool {
        matches!(self, ProvisionError::Analysis { .. } | ProvisionError::Validation { .. } | ProvisionError::TemplateNotFound(_) | ProvisionError::Convert(_))
    }

    pub(crate) fn validation(
        slot_key: &str,
        field: &str,
        reason: impl Into<String>,
    ) -> Self {
        ProvisionError::Validation {
            slot_key: slot_key.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ProvisionError> for String {
    fn from(val: ProvisionError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for ProvisionError {
    fn from(error: std::io::Error) -> Self {
        ProvisionError::IoError(error.to_string())
    }
}

impl From<ProvisionError> for std::io::Error {
    fn from(val: ProvisionError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<serde_json::Error> for ProvisionError {
    fn from(error: serde_json::Error) -> Self {
        ProvisionError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for ProvisionError {
    fn from(error: toml::de::Error) -> Self {
        ProvisionError::Config(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for ProvisionError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        ProvisionError::Convert(error.to_string())
    }
}

impl From<reqwest::Error> for ProvisionError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return ProvisionError::Timeout {
                step: error.url().map(|u| u.path().to_string()).unwrap_or_else(|| "request".to_string()),
            };
        }
        ProvisionError::Engine {
            status: error.status().map(|s| s.as_u16()),
            message: error.to_string(),
        }
    }
}
