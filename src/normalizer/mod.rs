//! Credential normalizer.
//!
//! Turns untrusted user input for a slot into the exact payload the engine
//! expects for the slot's credential kind: port coercion, transport flags,
//! host derivation between paired slots and the nested-vs-flat wire shape
//! are all decided here and nowhere else.

mod host;
mod transport;

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};

use reqwest::{Url, header::HeaderName};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use tracing::{debug, warn};

use crate::{
    ProvisionError, Result,
    analyzer::CredentialSlot,
    registry::*,
};

pub use host::{derive_host, validate_host};
pub use transport::{TlsSettings, TransportChoice, coerce_port, derive_tls};

const FIELD_SECURE: &str = "secure";
const FIELD_DISABLE_STARTTLS: &str = "disableStartTls";
const FIELD_REQUIRE_TLS: &str = "requireTLS";
const FIELD_ALLOW_UNAUTHORIZED_CERTS: &str = "allowUnauthorizedCerts";

/// Keys the engine reserves at the top level of a credential body.
const RESERVED_BODY_KEYS: &[&str] = &["name", "type", "data"];

/// Raw values for one slot, keyed by field name.
pub type SlotValues = BTreeMap<String, JsonValue>;

/// Groups request values keyed by `<slot_key>.<field>` per slot.
pub fn group_values(values: &BTreeMap<String, JsonValue>) -> HashMap<String, SlotValues> {
    let mut grouped: HashMap<String, SlotValues> = HashMap::new();
    for (key, value) in values {
        match key.split_once('.') {
            Some((slot_key, field)) if !slot_key.is_empty() && !field.is_empty() => {
                grouped.entry(slot_key.to_string()).or_default().insert(field.to_string(), value.clone());
            }
            _ => debug!("ignoring value without slot prefix: {}", key),
        }
    }
    grouped
}

/// Wire shape of a credential body.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    /// `{ name, type, data: { ..fields } }`
    #[default]
    Nested,
    /// `{ name, type, ..fields }`
    Flat,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    /// port has no known transport, the user should verify provider settings
    UnrecognizedPort,
    /// host was derived from the paired slot
    DerivedHost,
    /// value was copied from the paired slot
    InheritedValue,
}

/// Non-fatal observation surfaced to the caller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NormalizeWarning {
    pub slot_key: SlotKey,
    pub field: String,
    pub code: WarningCode,
    pub message: String,
}

/// Protocol-correct credential payload for one slot.
#[derive(Clone, PartialEq)]
pub struct NormalizedCredentialPayload {
    slot_key: SlotKey,
    kind: CredentialKind,
    shape: PayloadShape,
    fields: Map<String, JsonValue>,
    warnings: Vec<NormalizeWarning>,
}

impl fmt::Debug for NormalizedCredentialPayload {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        // field values may hold secrets
        f.debug_struct("NormalizedCredentialPayload")
            .field("slot_key", &self.slot_key)
            .field("kind", &self.kind)
            .field("shape", &self.shape)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("warnings", &self.warnings)
            .finish()
    }
}

impl NormalizedCredentialPayload {
    pub fn slot_key(&self) -> &str {
        &self.slot_key
    }

    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    pub fn shape(&self) -> PayloadShape {
        self.shape
    }

    pub fn fields(&self) -> &Map<String, JsonValue> {
        &self.fields
    }

    pub fn get(
        &self,
        field: &str,
    ) -> Option<&JsonValue> {
        self.fields.get(field)
    }

    pub fn warnings(&self) -> &[NormalizeWarning] {
        &self.warnings
    }

    /// `disableStartTls` may only appear together with `secure: true`.
    pub fn tls_invariant_holds(&self) -> bool {
        match self.fields.get(FIELD_DISABLE_STARTTLS) {
            None => true,
            Some(_) => self.fields.get(FIELD_SECURE) == Some(&JsonValue::Bool(true)),
        }
    }

    /// Builds the credential creation body in the shape the kind requires.
    pub fn engine_body(
        &self,
        name: &str,
    ) -> JsonValue {
        match self.shape {
            PayloadShape::Nested => json!({
                "name": name,
                "type": self.kind.engine_type(),
                "data": self.fields,
            }),
            PayloadShape::Flat => {
                let mut body = self.fields.clone();
                body.insert("name".to_string(), name.into());
                body.insert("type".to_string(), self.kind.engine_type().into());
                JsonValue::Object(body)
            }
        }
    }
}

/// Stateless normalizer configured with per-kind wire shapes.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    flat_kinds: Vec<CredentialKind>,
}

impl Normalizer {
    pub fn new(flat_kinds: &[CredentialKind]) -> Self {
        let flat_kinds = flat_kinds
            .iter()
            .copied()
            .filter(|kind| {
                let clashes = kind.fields().iter().any(|f| RESERVED_BODY_KEYS.contains(&f.name));
                if clashes {
                    warn!("{} has fields clashing with the credential body, keeping it nested", kind.engine_type());
                }
                !clashes
            })
            .collect();
        Self {
            flat_kinds,
        }
    }

    pub fn shape_for(
        &self,
        kind: CredentialKind,
    ) -> PayloadShape {
        if self.flat_kinds.contains(&kind) {
            PayloadShape::Flat
        } else {
            PayloadShape::Nested
        }
    }

    /// Normalizes every slot, failing on the first invalid field.
    ///
    /// Runs before any engine call so that bad input never leaves partial state.
    pub fn normalize_all(
        &self,
        slots: &[CredentialSlot],
        values: &BTreeMap<String, JsonValue>,
    ) -> Result<Vec<NormalizedCredentialPayload>> {
        let grouped = group_values(values);
        let empty = SlotValues::new();

        slots
            .iter()
            .map(|slot| {
                let own = grouped.get(slot.slot_key()).unwrap_or(&empty);
                let sibling = slot.paired().and_then(|p| grouped.get(&p.sibling));
                self.normalize(slot, own, sibling)
            })
            .collect()
    }

    /// Normalizes the raw values of one slot. `sibling` holds the raw values of
    /// the paired slot, if any, and only fills fields the user left empty.
    pub fn normalize(
        &self,
        slot: &CredentialSlot,
        values: &SlotValues,
        sibling: Option<&SlotValues>,
    ) -> Result<NormalizedCredentialPayload> {
        let mut payload = NormalizedCredentialPayload {
            slot_key: slot.slot_key().to_string(),
            kind: slot.kind(),
            shape: self.shape_for(slot.kind()),
            fields: Map::new(),
            warnings: vec![],
        };

        match slot.kind().family() {
            AuthFamily::MailServer => normalize_mail(slot, values, sibling, &mut payload)?,
            AuthFamily::Token | AuthFamily::BasicAuth => normalize_generic(slot, values, &mut payload)?,
        }

        if !payload.tls_invariant_holds() {
            return Err(ProvisionError::validation(slot.slot_key(), FIELD_DISABLE_STARTTLS, "disableStartTls emitted without secure transport"));
        }

        debug!("normalize({}) -> {:?}", slot.slot_key(), payload);
        Ok(payload)
    }
}

/// Reads a field as trimmed text. Empty strings and nulls are missing.
fn text(
    slot_key: &str,
    values: &SlotValues,
    field: &str,
) -> Result<Option<String>> {
    match values.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(JsonValue::Number(n)) => Ok(Some(n.to_string())),
        Some(JsonValue::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => Err(ProvisionError::validation(slot_key, field, "expected a text value")),
    }
}

fn required(
    slot_key: &str,
    field: &str,
    value: Option<String>,
) -> Result<String> {
    value.ok_or_else(|| ProvisionError::validation(slot_key, field, "value is required"))
}

fn normalize_mail(
    slot: &CredentialSlot,
    values: &SlotValues,
    sibling: Option<&SlotValues>,
    payload: &mut NormalizedCredentialPayload,
) -> Result<()> {
    let slot_key = slot.slot_key();
    let kind = slot.kind();

    // host: explicit value, else derived from the sibling's explicit host
    let host = match text(slot_key, values, FIELD_HOST)? {
        Some(host) => host,
        None => {
            let (pair, sibling_host) = match (slot.paired(), sibling) {
                (Some(pair), Some(sibling)) => (pair, text(&pair.sibling, sibling, FIELD_HOST)?),
                _ => return Err(ProvisionError::validation(slot_key, FIELD_HOST, "value is required")),
            };
            let sibling_host = required(slot_key, FIELD_HOST, sibling_host)?;
            let host = match derive_host(&sibling_host, pair.from_prefix, pair.to_prefix) {
                Some(host) => host,
                None => sibling_host.clone(),
            };
            payload.warnings.push(NormalizeWarning {
                slot_key: slot_key.to_string(),
                field: FIELD_HOST.to_string(),
                code: WarningCode::DerivedHost,
                message: format!("derived host '{}' from {} host '{}'", host, pair.sibling, sibling_host),
            });
            host
        }
    };
    validate_host(slot_key, FIELD_HOST, &host)?;

    let port = match values.get(FIELD_PORT) {
        Some(raw) if !is_blank(raw) => coerce_port(slot_key, FIELD_PORT, raw)?,
        _ => kind.default_port().ok_or_else(|| ProvisionError::validation(slot_key, FIELD_PORT, "value is required"))?,
    };

    let choice = match text(slot_key, values, FIELD_TRANSPORT)? {
        Some(raw) => raw
            .parse::<TransportChoice>()
            .map_err(|_| ProvisionError::validation(slot_key, FIELD_TRANSPORT, format!("'{}' is not one of {}", raw, TRANSPORT_OPTIONS.join(", "))))?,
        None => TransportChoice::Auto,
    };

    let mut inherited = |field: &str| -> Result<String> {
        if let Some(value) = text(slot_key, values, field)? {
            return Ok(value);
        }
        let from_sibling = match (slot.paired(), sibling) {
            (Some(pair), Some(sibling)) => text(&pair.sibling, sibling, field)?.map(|v| (pair, v)),
            _ => None,
        };
        let (pair, value) = from_sibling.ok_or_else(|| ProvisionError::validation(slot_key, field, "value is required"))?;
        payload.warnings.push(NormalizeWarning {
            slot_key: slot_key.to_string(),
            field: field.to_string(),
            code: WarningCode::InheritedValue,
            message: format!("reused {} from {}", field, pair.sibling),
        });
        Ok(value)
    };
    let user = inherited(FIELD_USER)?;
    let password = inherited(FIELD_PASSWORD)?;

    let tls = derive_tls(kind, port, choice);
    if tls.unrecognized_port() {
        payload.warnings.push(NormalizeWarning {
            slot_key: slot_key.to_string(),
            field: FIELD_PORT.to_string(),
            code: WarningCode::UnrecognizedPort,
            message: format!("port {} has no standard transport, verify your provider's settings", port),
        });
    }

    let fields = &mut payload.fields;
    fields.insert(FIELD_HOST.to_string(), host.into());
    fields.insert(FIELD_PORT.to_string(), port.into());
    fields.insert(FIELD_USER.to_string(), user.into());
    fields.insert(FIELD_PASSWORD.to_string(), password.into());
    fields.insert(FIELD_SECURE.to_string(), tls.secure().into());

    match kind {
        CredentialKind::Smtp => {
            if tls.disable_start_tls() {
                fields.insert(FIELD_DISABLE_STARTTLS.to_string(), true.into());
            } else {
                fields.insert(FIELD_REQUIRE_TLS.to_string(), tls.require_tls().into());
            }
        }
        _ => {
            fields.insert(FIELD_ALLOW_UNAUTHORIZED_CERTS.to_string(), false.into());
        }
    }

    Ok(())
}

fn normalize_generic(
    slot: &CredentialSlot,
    values: &SlotValues,
    payload: &mut NormalizedCredentialPayload,
) -> Result<()> {
    let slot_key = slot.slot_key();

    for spec in slot.field_schema() {
        let value = match text(slot_key, values, spec.name)? {
            Some(value) => value,
            None if spec.required => return Err(ProvisionError::validation(slot_key, spec.name, "value is required")),
            None => continue,
        };

        match spec.name {
            FIELD_URL | FIELD_WEBDAV_URL => validate_url(slot_key, spec.name, &value)?,
            FIELD_HEADER_NAME if slot.kind() == CredentialKind::HttpHeaderAuth => {
                HeaderName::from_bytes(value.as_bytes())
                    .map_err(|_| ProvisionError::validation(slot_key, spec.name, format!("'{}' is not a valid header name", value)))?;
            }
            _ => {}
        }

        payload.fields.insert(spec.name.to_string(), value.into());
    }

    Ok(())
}

fn validate_url(
    slot_key: &str,
    field: &str,
    value: &str,
) -> Result<()> {
    let url = Url::parse(value).map_err(|err| ProvisionError::validation(slot_key, field, format!("'{}' is not a valid url: {}", value, err)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ProvisionError::validation(slot_key, field, "url must use http or https"));
    }
    Ok(())
}

fn is_blank(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        _ => false,
    }
}
