use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use zeroize::Zeroize;

use super::{CredentialError, CredentialKind};

/// Parsed, schema-validated credential material, prior to construction of a
/// usable credential object.
///
/// Owns the complete validated JSON object (extra fields included) so that
/// staging writes exactly what was supplied. The secret values inside are
/// scrubbed when the descriptor is consumed or dropped, on success and
/// failure paths alike.
pub struct CredentialDescriptor {
    kind: CredentialKind,
    fields: Map<String, Value>,
}

impl CredentialDescriptor {
    #[must_use]
    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    /// Move a string field out of the descriptor without copying it.
    pub(crate) fn take_string(&mut self, name: &str) -> Option<String> {
        match self.fields.remove(name) {
            Some(Value::String(value)) => Some(value),
            Some(mut other) => {
                scrub_value(&mut other);
                None
            }
            None => None,
        }
    }

    /// Overwrite every string value and drop the backing storage. Runs
    /// automatically on drop; calling it earlier is harmless.
    pub fn scrub(&mut self) {
        scrub_fields(&mut self.fields);
    }
}

impl Drop for CredentialDescriptor {
    fn drop(&mut self) {
        self.scrub();
    }
}

// Serializes the full validated object; used by staging only, never by
// logging.
impl Serialize for CredentialDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

// The descriptor carries secret material; Debug shows the shape, never the
// values.
impl fmt::Debug for CredentialDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialDescriptor")
            .field("kind", &self.kind)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn scrub_value(value: &mut Value) {
    match value {
        Value::String(s) => s.zeroize(),
        Value::Array(items) => items.iter_mut().for_each(scrub_value),
        Value::Object(map) => scrub_fields(map),
        _ => {}
    }
}

fn scrub_fields(fields: &mut Map<String, Value>) {
    for value in fields.values_mut() {
        scrub_value(value);
    }
    fields.clear();
}

/// Parse a raw credential string and validate it against the two supported
/// schemas.
///
/// # Errors
///
/// - `InvalidJson` when the input is not a JSON object; the message carries
///   no fragment of the input.
/// - `UnsupportedType` when `type` is absent or not a known variant.
/// - `Incomplete` when a required field for the declared type is absent or
///   empty.
pub fn parse_and_validate(raw: &str) -> Result<CredentialDescriptor, CredentialError> {
    let parsed: Value =
        serde_json::from_str(raw).map_err(|_| CredentialError::InvalidJson)?;
    let Value::Object(mut fields) = parsed else {
        return Err(CredentialError::InvalidJson);
    };

    let kind = match fields.get("type").and_then(Value::as_str) {
        Some("service_account") => CredentialKind::ServiceAccount,
        Some("authorized_user") => CredentialKind::AuthorizedUser,
        other => {
            let kind = other.unwrap_or_default().to_string();
            scrub_fields(&mut fields);
            return Err(CredentialError::UnsupportedType { kind });
        }
    };

    let complete = kind.required_fields().iter().all(|field| {
        fields
            .get(*field)
            .and_then(Value::as_str)
            .is_some_and(|value| !value.is_empty())
    });
    if !complete {
        scrub_fields(&mut fields);
        return Err(CredentialError::Incomplete { kind });
    }

    Ok(CredentialDescriptor { kind, fields })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creds::testdata::{authorized_user_json, service_account_json};

    #[test]
    fn valid_service_account_parses_and_preserves_type() {
        let descriptor = parse_and_validate(&service_account_json()).expect("valid descriptor");
        assert_eq!(descriptor.kind(), CredentialKind::ServiceAccount);
    }

    #[test]
    fn valid_authorized_user_parses_and_preserves_type() {
        let descriptor = parse_and_validate(&authorized_user_json()).expect("valid descriptor");
        assert_eq!(descriptor.kind(), CredentialKind::AuthorizedUser);
    }

    #[test]
    fn malformed_json_yields_fixed_message_without_input_fragment() {
        let err = parse_and_validate("{\"invalid\": json}").expect_err("must fail");
        let message = err.to_string();
        assert!(message.contains("Invalid credentials JSON format"));
        assert!(!message.contains("json}"));
        assert!(!message.contains("invalid"));
    }

    #[test]
    fn non_object_json_is_invalid() {
        let err = parse_and_validate("[1, 2, 3]").expect_err("must fail");
        assert!(matches!(err, CredentialError::InvalidJson));
    }

    #[test]
    fn unknown_type_is_unsupported() {
        let raw = serde_json::json!({"type": "external_account"}).to_string();
        let err = parse_and_validate(&raw).expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "Unsupported credential type: 'external_account'"
        );
    }

    #[test]
    fn missing_type_is_unsupported() {
        let err = parse_and_validate("{}").expect_err("must fail");
        assert!(matches!(err, CredentialError::UnsupportedType { .. }));
    }

    #[test]
    fn service_account_without_private_key_is_incomplete() {
        let raw = serde_json::json!({
            "type": "service_account",
            "client_email": "ce",
            "project_id": "pi",
        })
        .to_string();
        let err = parse_and_validate(&raw).expect_err("must fail");
        assert!(err.to_string().contains("Incomplete service_account"));
    }

    #[test]
    fn authorized_user_without_refresh_token_is_incomplete() {
        let raw = serde_json::json!({
            "type": "authorized_user",
            "client_id": "ci",
            "client_secret": "cs",
        })
        .to_string();
        let err = parse_and_validate(&raw).expect_err("must fail");
        assert!(err.to_string().contains("Incomplete authorized_user"));
    }

    #[test]
    fn empty_required_field_is_incomplete() {
        let raw = serde_json::json!({
            "type": "service_account",
            "private_key": "",
            "client_email": "ce",
            "project_id": "pi",
        })
        .to_string();
        let err = parse_and_validate(&raw).expect_err("must fail");
        assert!(matches!(
            err,
            CredentialError::Incomplete {
                kind: CredentialKind::ServiceAccount
            }
        ));
    }

    #[test]
    fn debug_output_never_contains_field_values() {
        let descriptor = parse_and_validate(&service_account_json()).expect("valid descriptor");
        let rendered = format!("{descriptor:?}");
        assert!(rendered.contains("private_key"));
        assert!(!rendered.contains("MIIEvTESTKEY"));
        assert!(!rendered.contains("test-project"));
    }

    #[test]
    fn scrub_empties_the_descriptor() {
        let mut descriptor =
            parse_and_validate(&service_account_json()).expect("valid descriptor");
        descriptor.scrub();
        assert_eq!(serde_json::to_value(&descriptor).expect("serialize"), serde_json::json!({}));
    }
}
