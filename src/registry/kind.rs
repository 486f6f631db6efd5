//! Credential kinds known to the engine and the field schema each one needs.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// slot key, `<group>-<discriminator>`
pub type SlotKey = String;

/// Credential types the pipeline can materialize.
///
/// The serialized form is the engine's credential type name.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::AsRefStr,
    strum::IntoStaticStr,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum CredentialKind {
    #[serde(rename = "imap")]
    #[strum(serialize = "imap")]
    Imap,
    #[serde(rename = "smtp")]
    #[strum(serialize = "smtp")]
    Smtp,
    #[serde(rename = "openAiApi")]
    #[strum(serialize = "openAiApi")]
    OpenAi,
    #[serde(rename = "anthropicApi")]
    #[strum(serialize = "anthropicApi")]
    Anthropic,
    #[serde(rename = "nextCloudApi")]
    #[strum(serialize = "nextCloudApi")]
    NextCloud,
    #[serde(rename = "httpBasicAuth")]
    #[strum(serialize = "httpBasicAuth")]
    HttpBasicAuth,
    #[serde(rename = "httpHeaderAuth")]
    #[strum(serialize = "httpHeaderAuth")]
    HttpHeaderAuth,
}

/// How a credential authenticates against its provider.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthFamily {
    /// host / port / user / password / transport
    MailServer,
    /// a single secret token, optionally with an endpoint
    Token,
    /// user / password, optionally with an endpoint
    BasicAuth,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum InputType {
    Text,
    Password,
    PortNumber,
    Select,
}

/// One field of a credential's input schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub input: InputType,
    pub required: bool,
    pub default: Option<JsonValue>,
    pub options: &'static [&'static str],
    /// may be inherited from a paired sibling slot
    pub pairable: bool,
}

pub const FIELD_HOST: &str = "host";
pub const FIELD_PORT: &str = "port";
pub const FIELD_USER: &str = "user";
pub const FIELD_PASSWORD: &str = "password";
pub const FIELD_TRANSPORT: &str = "transport";
pub const FIELD_API_KEY: &str = "apiKey";
pub const FIELD_URL: &str = "url";
pub const FIELD_WEBDAV_URL: &str = "webDavUrl";
pub const FIELD_HEADER_NAME: &str = "name";
pub const FIELD_HEADER_VALUE: &str = "value";

pub const TRANSPORT_OPTIONS: &[&str] = &["auto", "implicit_tls", "starttls", "none"];

impl FieldSpec {
    fn new(
        name: &'static str,
        label: &'static str,
        input: InputType,
        required: bool,
    ) -> Self {
        Self {
            name,
            label,
            input,
            required,
            default: None,
            options: &[],
            pairable: false,
        }
    }

    fn with_default(
        mut self,
        value: JsonValue,
    ) -> Self {
        self.default = Some(value);
        self
    }

    fn with_options(
        mut self,
        options: &'static [&'static str],
    ) -> Self {
        self.options = options;
        self
    }

    fn pairable(mut self) -> Self {
        self.pairable = true;
        self
    }
}

impl CredentialKind {
    /// Credential type name on the engine.
    pub fn engine_type(&self) -> &'static str {
        self.into()
    }

    pub fn group(&self) -> &'static str {
        match self {
            CredentialKind::Imap | CredentialKind::Smtp => "mail",
            CredentialKind::OpenAi | CredentialKind::Anthropic => "llm",
            CredentialKind::NextCloud => "file-sync",
            CredentialKind::HttpBasicAuth | CredentialKind::HttpHeaderAuth => "http",
        }
    }

    pub fn discriminator(&self) -> &'static str {
        match self {
            CredentialKind::Imap => "inbound",
            CredentialKind::Smtp => "outbound",
            CredentialKind::OpenAi => "openai",
            CredentialKind::Anthropic => "anthropic",
            CredentialKind::NextCloud => "nextcloud",
            CredentialKind::HttpBasicAuth => "basic",
            CredentialKind::HttpHeaderAuth => "header",
        }
    }

    pub fn slot_key(&self) -> SlotKey {
        format!("{}-{}", self.group(), self.discriminator())
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            CredentialKind::Imap => "IMAP",
            CredentialKind::Smtp => "SMTP",
            CredentialKind::OpenAi => "OpenAI",
            CredentialKind::Anthropic => "Anthropic",
            CredentialKind::NextCloud => "Nextcloud",
            CredentialKind::HttpBasicAuth => "HTTP Basic Auth",
            CredentialKind::HttpHeaderAuth => "HTTP Header Auth",
        }
    }

    pub fn family(&self) -> AuthFamily {
        match self {
            CredentialKind::Imap | CredentialKind::Smtp => AuthFamily::MailServer,
            CredentialKind::OpenAi | CredentialKind::Anthropic | CredentialKind::HttpHeaderAuth => AuthFamily::Token,
            CredentialKind::NextCloud | CredentialKind::HttpBasicAuth => AuthFamily::BasicAuth,
        }
    }

    /// The other half of a mailbox: inbound pairs with outbound and back.
    pub fn sibling(&self) -> Option<CredentialKind> {
        match self {
            CredentialKind::Imap => Some(CredentialKind::Smtp),
            CredentialKind::Smtp => Some(CredentialKind::Imap),
            _ => None,
        }
    }

    /// Well-known host prefix of the service, e.g. `imap` in `imap.example.com`.
    pub fn service_prefix(&self) -> Option<&'static str> {
        match self {
            CredentialKind::Imap => Some("imap"),
            CredentialKind::Smtp => Some("smtp"),
            _ => None,
        }
    }

    pub fn default_port(&self) -> Option<u16> {
        match self {
            CredentialKind::Imap => Some(993),
            CredentialKind::Smtp => Some(465),
            _ => None,
        }
    }

    /// Input schema of the credential, in display order.
    pub fn fields(&self) -> Vec<FieldSpec> {
        match self.family() {
            AuthFamily::MailServer => vec![
                FieldSpec::new(FIELD_HOST, "Host", InputType::Text, true).pairable(),
                FieldSpec::new(FIELD_PORT, "Port", InputType::PortNumber, false).with_default(self.default_port().into()),
                FieldSpec::new(FIELD_USER, "User", InputType::Text, true).pairable(),
                FieldSpec::new(FIELD_PASSWORD, "Password", InputType::Password, true).pairable(),
                FieldSpec::new(FIELD_TRANSPORT, "Transport security", InputType::Select, false)
                    .with_options(TRANSPORT_OPTIONS)
                    .with_default("auto".into()),
            ],
            AuthFamily::Token => match self {
                CredentialKind::HttpHeaderAuth => vec![
                    FieldSpec::new(FIELD_HEADER_NAME, "Header name", InputType::Text, true),
                    FieldSpec::new(FIELD_HEADER_VALUE, "Header value", InputType::Password, true),
                ],
                CredentialKind::OpenAi => vec![
                    FieldSpec::new(FIELD_API_KEY, "API key", InputType::Password, true),
                    FieldSpec::new(FIELD_URL, "Base URL", InputType::Text, false),
                ],
                _ => vec![FieldSpec::new(FIELD_API_KEY, "API key", InputType::Password, true)],
            },
            AuthFamily::BasicAuth => {
                let mut fields = vec![];
                if *self == CredentialKind::NextCloud {
                    fields.push(FieldSpec::new(FIELD_WEBDAV_URL, "WebDAV URL", InputType::Text, true));
                }
                fields.push(FieldSpec::new(FIELD_USER, "User", InputType::Text, true));
                fields.push(FieldSpec::new(FIELD_PASSWORD, "Password", InputType::Password, true));
                fields
            }
        }
    }

    pub fn field(
        &self,
        name: &str,
    ) -> Option<FieldSpec> {
        self.fields().into_iter().find(|f| f.name == name)
    }
}

pub fn group_title(group: &str) -> &'static str {
    match group {
        "mail" => "Email account",
        "llm" => "AI model providers",
        "file-sync" => "File sync",
        "http" => "HTTP services",
        _ => "Integrations",
    }
}
