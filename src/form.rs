//! Onboarding form projection.
//!
//! Turns the slot list into an ordered, declarative form description. The
//! projection is pure and stable so callers can snapshot it.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    analyzer::CredentialSlot,
    registry::{CredentialKind, FIELD_HOST, FIELD_PORT, InputType, SlotKey, group_title},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSection {
    /// kind group, e.g. `mail`
    pub group: String,
    pub title: String,
    pub slot_keys: Vec<SlotKey>,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    /// `<slot_key>.<name>`, the key expected in deploy request values
    pub key: String,
    pub slot_key: SlotKey,
    pub credential_kind: CredentialKind,
    pub name: String,
    pub label: String,
    pub input: InputType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Builds the value key a caller uses for a slot field.
pub fn field_key(
    slot_key: &str,
    field: &str,
) -> String {
    format!("{}.{}", slot_key, field)
}

/// Projects slots into form sections, one per kind group, in slot order.
pub fn build_form(slots: &[CredentialSlot]) -> Vec<FormSection> {
    let mut sections: Vec<FormSection> = vec![];

    for (position, slot) in slots.iter().enumerate() {
        let group = slot.kind().group();
        let section = match sections.iter().position(|s| s.group == group) {
            Some(i) => &mut sections[i],
            None => {
                sections.push(FormSection {
                    group: group.to_string(),
                    title: group_title(group).to_string(),
                    slot_keys: vec![],
                    fields: vec![],
                });
                let last = sections.len() - 1;
                &mut sections[last]
            }
        };

        section.slot_keys.push(slot.slot_key().to_string());

        // the later half of a pair may borrow values from the earlier one
        let derives_from = slot.paired().filter(|p| slots[..position].iter().any(|s| s.slot_key() == p.sibling));

        for spec in slot.field_schema() {
            let derivable = spec.pairable && derives_from.is_some();
            let hint = match (derivable, derives_from) {
                (true, Some(pair)) if spec.name == FIELD_HOST => {
                    Some(format!("Leave empty to use the {} host with '{}' in place of '{}'.", pair.sibling, pair.to_prefix, pair.from_prefix))
                }
                (true, Some(pair)) => Some(format!("Leave empty to reuse the value from {}.", pair.sibling)),
                _ if spec.name == FIELD_PORT => Some(port_hint(slot.kind())),
                _ => None,
            };

            section.fields.push(FormField {
                key: field_key(slot.slot_key(), spec.name),
                slot_key: slot.slot_key().to_string(),
                credential_kind: slot.kind(),
                name: spec.name.to_string(),
                label: format!("{} {}", slot.kind().display_name(), spec.label),
                input: spec.input,
                required: spec.required && !derivable,
                default: spec.default.clone(),
                options: spec.options.iter().map(|o| o.to_string()).collect(),
                hint,
            });
        }
    }

    sections
}

fn port_hint(kind: CredentialKind) -> String {
    match kind {
        CredentialKind::Smtp => "465 uses implicit TLS, 587 and 25 upgrade with STARTTLS.".to_string(),
        CredentialKind::Imap => "993 uses implicit TLS, 143 upgrades with STARTTLS.".to_string(),
        _ => "Verify your provider's settings.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{analyzer::analyze, model::WorkflowTemplate, registry::Registry};

    fn slots(nodes: serde_json::Value) -> Vec<CredentialSlot> {
        let template = WorkflowTemplate::from_value(json!({ "name": "t", "nodes": nodes })).unwrap();
        analyze(&template, &Registry::with_defaults()).unwrap()
    }

    #[test]
    fn test_form_groups_mail_slots_in_one_section() {
        let slots = slots(json!([
            { "id": "in", "name": "Read", "type": "n8n-nodes-base.emailReadImap" },
            { "id": "llm", "name": "Model", "type": "@n8n/n8n-nodes-langchain.lmChatAnthropic" },
            { "id": "out", "name": "Send", "type": "n8n-nodes-base.emailSend" }
        ]));
        let form = build_form(&slots);

        assert_eq!(form.len(), 2);
        assert_eq!(form[0].group, "mail");
        assert_eq!(form[0].slot_keys, vec!["mail-inbound".to_string(), "mail-outbound".to_string()]);
        assert_eq!(form[0].fields.len(), 10);
        assert_eq!(form[1].group, "llm");
        assert_eq!(form[1].fields[0].key, "llm-anthropic.apiKey");
        assert_eq!(form[1].fields[0].input, InputType::Password);
    }

    #[test]
    fn test_form_marks_derivable_fields_optional() {
        let slots = slots(json!([
            { "id": "in", "name": "Read", "type": "n8n-nodes-base.emailReadImap" },
            { "id": "out", "name": "Send", "type": "n8n-nodes-base.emailSend" }
        ]));
        let form = build_form(&slots);
        let field = |key: &str| form[0].fields.iter().find(|f| f.key == key).unwrap().clone();

        assert!(field("mail-inbound.host").required);
        let outbound_host = field("mail-outbound.host");
        assert!(!outbound_host.required);
        assert!(outbound_host.hint.unwrap().contains("'smtp' in place of 'imap'"));
        assert!(!field("mail-outbound.password").required);
        assert_eq!(field("mail-outbound.port").default, Some(json!(465)));
        assert_eq!(field("mail-outbound.transport").options, vec!["auto", "implicit_tls", "starttls", "none"]);
    }

    #[test]
    fn test_form_is_stable() {
        let slots = slots(json!([
            { "id": "nc", "name": "Files", "type": "n8n-nodes-base.nextCloud" },
            { "id": "out", "name": "Send", "type": "n8n-nodes-base.emailSend" }
        ]));
        let first = serde_json::to_string(&build_form(&slots)).unwrap();
        let second = serde_json::to_string(&build_form(&slots)).unwrap();
        assert_eq!(first, second);
        assert!(build_form(&[]).is_empty());
    }
}
