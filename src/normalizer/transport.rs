//! Port coercion and transport security derivation for mail credentials.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{ProvisionError, Result, registry::CredentialKind};

/// Transport the user can pick explicitly; `Auto` derives it from the port.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString, strum::EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransportChoice {
    #[default]
    Auto,
    ImplicitTls,
    Starttls,
    None,
}

/// Resolved transport flags.
///
/// Only constructible through [`TlsSettings::implicit_tls`],
/// [`TlsSettings::starttls`] and [`TlsSettings::plain`], so
/// `disable_start_tls` can never be set without `secure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsSettings {
    secure: bool,
    disable_start_tls: bool,
    require_tls: bool,
    /// port was not recognised, caller should hint the user to verify settings
    unrecognized_port: bool,
}

impl TlsSettings {
    pub fn implicit_tls() -> Self {
        Self {
            secure: true,
            disable_start_tls: true,
            require_tls: false,
            unrecognized_port: false,
        }
    }

    pub fn starttls() -> Self {
        Self {
            secure: false,
            disable_start_tls: false,
            require_tls: true,
            unrecognized_port: false,
        }
    }

    pub fn plain() -> Self {
        Self {
            secure: false,
            disable_start_tls: false,
            require_tls: false,
            unrecognized_port: false,
        }
    }

    fn unrecognized(mut self) -> Self {
        self.unrecognized_port = true;
        self
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn disable_start_tls(&self) -> bool {
        self.disable_start_tls
    }

    pub fn require_tls(&self) -> bool {
        self.require_tls
    }

    pub fn unrecognized_port(&self) -> bool {
        self.unrecognized_port
    }
}

/// Coerces a raw port value (string or number) into a valid TCP port.
pub fn coerce_port(
    slot_key: &str,
    field: &str,
    raw: &JsonValue,
) -> Result<u16> {
    let invalid = |shown: String| ProvisionError::validation(slot_key, field, format!("'{}' is not a port between 1 and 65535", shown));

    let number = match raw {
        JsonValue::Number(n) => n.as_u64().ok_or_else(|| invalid(n.to_string()))?,
        JsonValue::String(s) => s.trim().parse::<u64>().map_err(|_| invalid(s.clone()))?,
        other => return Err(invalid(other.to_string())),
    };

    match u16::try_from(number) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(invalid(number.to_string())),
    }
}

/// Derives transport flags for a mail credential.
///
/// An explicit choice always wins; `Auto` looks the port up in the kind's
/// table of well-known ports and falls back to plain with a warning flag.
pub fn derive_tls(
    kind: CredentialKind,
    port: u16,
    choice: TransportChoice,
) -> TlsSettings {
    match choice {
        TransportChoice::ImplicitTls => TlsSettings::implicit_tls(),
        TransportChoice::Starttls => TlsSettings::starttls(),
        TransportChoice::None => TlsSettings::plain(),
        TransportChoice::Auto => match (kind, port) {
            (CredentialKind::Smtp, 465) | (CredentialKind::Imap, 993) => TlsSettings::implicit_tls(),
            (CredentialKind::Smtp, 587 | 25) | (CredentialKind::Imap, 143) => TlsSettings::starttls(),
            _ => TlsSettings::plain().unrecognized(),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_coerce_port_accepts_strings_and_numbers() {
        assert_eq!(coerce_port("s", "port", &json!("993")).unwrap(), 993);
        assert_eq!(coerce_port("s", "port", &json!(" 587 ")).unwrap(), 587);
        assert_eq!(coerce_port("s", "port", &json!(465)).unwrap(), 465);
        assert_eq!(coerce_port("s", "port", &json!(65535)).unwrap(), 65535);
    }

    #[test]
    fn test_coerce_port_rejects_invalid() {
        for raw in [json!("abc"), json!("0"), json!(0), json!(65536), json!("-1"), json!(-25), json!(99.5), json!(true), json!(null), json!("")] {
            let err = coerce_port("mail-outbound", "port", &raw).unwrap_err();
            match err {
                ProvisionError::Validation { slot_key, field, .. } => {
                    assert_eq!(slot_key, "mail-outbound");
                    assert_eq!(field, "port");
                }
                other => panic!("unexpected error for {}: {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_derive_smtp_ports() {
        let implicit = derive_tls(CredentialKind::Smtp, 465, TransportChoice::Auto);
        assert!(implicit.secure() && implicit.disable_start_tls() && !implicit.unrecognized_port());

        for port in [587, 25] {
            let starttls = derive_tls(CredentialKind::Smtp, port, TransportChoice::Auto);
            assert!(!starttls.secure() && starttls.require_tls() && !starttls.disable_start_tls());
        }

        let other = derive_tls(CredentialKind::Smtp, 2525, TransportChoice::Auto);
        assert!(!other.secure() && !other.require_tls() && other.unrecognized_port());
    }

    #[test]
    fn test_derive_imap_ports() {
        assert_eq!(derive_tls(CredentialKind::Imap, 993, TransportChoice::Auto), TlsSettings::implicit_tls());
        assert_eq!(derive_tls(CredentialKind::Imap, 143, TransportChoice::Auto), TlsSettings::starttls());
        assert!(derive_tls(CredentialKind::Imap, 465, TransportChoice::Auto).unrecognized_port());
    }

    #[test]
    fn test_explicit_choice_overrides_port() {
        assert_eq!(derive_tls(CredentialKind::Smtp, 465, TransportChoice::Starttls), TlsSettings::starttls());
        assert_eq!(derive_tls(CredentialKind::Smtp, 2525, TransportChoice::ImplicitTls), TlsSettings::implicit_tls());
        assert_eq!(derive_tls(CredentialKind::Smtp, 587, TransportChoice::None), TlsSettings::plain());
    }

    #[test]
    fn test_disable_start_tls_implies_secure_for_every_port() {
        for kind in [CredentialKind::Smtp, CredentialKind::Imap] {
            for choice in TransportChoice::iter() {
                for port in 1..=u16::MAX {
                    let tls = derive_tls(kind, port, choice);
                    assert!(!tls.disable_start_tls() || tls.secure(), "{:?} {:?} {}", kind, choice, port);
                }
            }
        }
    }
}
