//! Credential schema registry.
//!
//! Maps a node's declared `type` to the credential kinds it needs. Node types
//! that need no credential are registered explicitly so that an unknown type
//! can be told apart from a credential-free one.

mod kind;

use std::collections::HashMap;

use tracing::trace;

use crate::model::NodeModel;

pub use kind::*;

/// What a node type requires from the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    /// the node always needs this credential
    Always(CredentialKind),
    /// the node needs a credential only when `parameter` names one of `options`
    ByParameter {
        parameter: &'static str,
        options: Vec<(&'static str, CredentialKind)>,
    },
}

/// Typed lookup failure for a node type the registry has never seen, or a
/// known type whose selecting parameter names an unknown credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedNodeType {
    pub node_type: String,
    /// `(parameter, value)` when the selecting parameter is the culprit
    pub parameter: Option<(String, String)>,
}

impl std::fmt::Display for UnsupportedNodeType {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match &self.parameter {
            Some((parameter, value)) => write!(f, "unsupported integration type '{}' ({} '{}')", self.node_type, parameter, value),
            None => write!(f, "unsupported integration type '{}'", self.node_type),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    nodes: HashMap<String, Vec<Requirement>>,
}

const CREDENTIAL_FREE_NODES: &[&str] = &[
    "n8n-nodes-base.manualTrigger",
    "n8n-nodes-base.scheduleTrigger",
    "n8n-nodes-base.webhook",
    "n8n-nodes-base.respondToWebhook",
    "n8n-nodes-base.set",
    "n8n-nodes-base.if",
    "n8n-nodes-base.switch",
    "n8n-nodes-base.filter",
    "n8n-nodes-base.code",
    "n8n-nodes-base.merge",
    "n8n-nodes-base.noOp",
    "n8n-nodes-base.wait",
    "n8n-nodes-base.splitInBatches",
    "n8n-nodes-base.stickyNote",
    "@n8n/n8n-nodes-langchain.agent",
    "@n8n/n8n-nodes-langchain.chainLlm",
    "@n8n/n8n-nodes-langchain.memoryBufferWindow",
    "@n8n/n8n-nodes-langchain.outputParserStructured",
];

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that knows the common engine node types.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        for node_type in CREDENTIAL_FREE_NODES {
            registry.register_credential_free(node_type);
        }

        registry.register_node("n8n-nodes-base.emailReadImap", &[CredentialKind::Imap]);
        registry.register_node("n8n-nodes-base.emailSend", &[CredentialKind::Smtp]);
        registry.register_node("n8n-nodes-base.openAi", &[CredentialKind::OpenAi]);
        registry.register_node("@n8n/n8n-nodes-langchain.openAi", &[CredentialKind::OpenAi]);
        registry.register_node("@n8n/n8n-nodes-langchain.lmChatOpenAi", &[CredentialKind::OpenAi]);
        registry.register_node("@n8n/n8n-nodes-langchain.embeddingsOpenAi", &[CredentialKind::OpenAi]);
        registry.register_node("@n8n/n8n-nodes-langchain.lmChatAnthropic", &[CredentialKind::Anthropic]);
        registry.register_node("n8n-nodes-base.nextCloud", &[CredentialKind::NextCloud]);
        registry.register_by_parameter(
            "n8n-nodes-base.httpRequest",
            "genericAuthType",
            &[
                ("httpBasicAuth", CredentialKind::HttpBasicAuth),
                ("httpHeaderAuth", CredentialKind::HttpHeaderAuth),
            ],
        );

        registry
    }

    /// Registers a node type that always needs the given credentials.
    pub fn register_node(
        &mut self,
        node_type: &str,
        kinds: &[CredentialKind],
    ) {
        let requirements = kinds.iter().map(|k| Requirement::Always(*k)).collect();
        self.nodes.insert(node_type.to_string(), requirements);
    }

    /// Registers a node type that needs no credential.
    pub fn register_credential_free(
        &mut self,
        node_type: &str,
    ) {
        self.nodes.insert(node_type.to_string(), vec![]);
    }

    /// Registers a node type whose credential is selected by one of its parameters.
    pub fn register_by_parameter(
        &mut self,
        node_type: &str,
        parameter: &'static str,
        options: &[(&'static str, CredentialKind)],
    ) {
        self.nodes.insert(
            node_type.to_string(),
            vec![Requirement::ByParameter {
                parameter,
                options: options.to_vec(),
            }],
        );
    }

    pub fn contains(
        &self,
        node_type: &str,
    ) -> bool {
        self.nodes.contains_key(node_type)
    }

    /// Resolves the credential kinds a concrete node needs.
    pub fn lookup(
        &self,
        node: &NodeModel,
    ) -> std::result::Result<Vec<CredentialKind>, UnsupportedNodeType> {
        let requirements = self.nodes.get(&node.node_type).ok_or_else(|| UnsupportedNodeType {
            node_type: node.node_type.clone(),
            parameter: None,
        })?;

        let mut kinds = vec![];
        for requirement in requirements {
            match requirement {
                Requirement::Always(kind) => kinds.push(*kind),
                Requirement::ByParameter { parameter, options } => {
                    // absent or empty means the node authenticates with nothing
                    let Some(selected) = node.parameter_str(parameter).map(str::trim).filter(|s| !s.is_empty()) else {
                        continue;
                    };
                    let kind = options.iter().find(|(value, _)| *value == selected).map(|(_, kind)| *kind).ok_or_else(|| UnsupportedNodeType {
                        node_type: node.node_type.clone(),
                        parameter: Some((parameter.to_string(), selected.to_string())),
                    })?;
                    kinds.push(kind);
                }
            }
        }
        trace!("registry::lookup({}) -> {:?}", node.node_type, kinds);

        Ok(kinds)
    }
}
