//! Wire shape of inbound webhook bodies.
//!
//! The ingestion endpoint checks every body with [`WebhookPayload::from_json`]
//! to reject malformed requests before they reach the buffer. Missing
//! fields fall back to their zero values; wrong types and non-object bodies
//! are rejected. The checked JSON value itself is what gets buffered.

use serde::de::{Error as _, Unexpected};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body accepted by `POST /log`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookPayload {
    /// Identifier of the user the event belongs to.
    pub user_id: i64,
    /// Monetary total attached to the event.
    pub total: f64,
    /// Human-readable title.
    pub title: String,
    /// Nested metadata block.
    pub meta: Meta,
}

impl WebhookPayload {
    /// Decode a payload from an already parsed JSON value.
    ///
    /// Only objects are accepted. Serde would otherwise read a JSON array
    /// positionally into the struct fields.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not an object or a field has the
    /// wrong type.
    pub fn from_json(value: &Value) -> Result<Self, serde_json::Error> {
        let unexpected = match value {
            Value::Object(_) => return Self::deserialize(value),
            Value::Array(_) => Unexpected::Seq,
            Value::String(s) => Unexpected::Str(s),
            Value::Bool(b) => Unexpected::Bool(*b),
            Value::Number(_) => Unexpected::Other("number"),
            Value::Null => Unexpected::Unit,
        };
        Err(serde_json::Error::invalid_type(unexpected, &"a JSON object"))
    }
}

/// Metadata nested under `meta`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Meta {
    /// Login history, oldest first.
    pub logins: Vec<Login>,
    /// Contact numbers.
    pub phone_numbers: PhoneNumbers,
    /// Completion flag.
    pub completed: bool,
}

/// One entry of the login history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Login {
    /// Login time as sent by the producer (not parsed).
    pub time: String,
    /// Source IP address as sent by the producer (not parsed).
    pub ip: String,
}

/// Home and mobile phone numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneNumbers {
    /// Home number.
    pub home: String,
    /// Mobile number.
    pub mobile: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_full_payload() {
        let body = r#"{
            "user_id": 1,
            "total": 1.65,
            "title": "delectus aut autem",
            "meta": {
                "logins": [{"time": "2020-08-08T01:52:50Z", "ip": "0.0.0.0"}],
                "phone_numbers": {"home": "555-1212", "mobile": "123-5555"},
                "completed": false
            }
        }"#;
        let payload: WebhookPayload = serde_json::from_str(body).unwrap();
        assert_eq!(payload.user_id, 1);
        assert_eq!(payload.title, "delectus aut autem");
        assert_eq!(payload.meta.logins.len(), 1);
        assert_eq!(payload.meta.phone_numbers.mobile, "123-5555");
        assert!(!payload.meta.completed);
    }

    #[test]
    fn missing_fields_take_zero_values() {
        let payload: WebhookPayload = serde_json::from_str(r#"{"title": "only"}"#).unwrap();
        assert_eq!(payload.user_id, 0);
        assert!(payload.meta.logins.is_empty());
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(serde_json::from_str::<WebhookPayload>(r#"{"user_id": "abc"}"#).is_err());
        assert!(serde_json::from_str::<WebhookPayload>("42").is_err());
        assert!(serde_json::from_str::<WebhookPayload>("{not json").is_err());
        assert!(WebhookPayload::from_json(&json!({"total": "lots"})).is_err());
    }

    #[test]
    fn only_objects_are_accepted() {
        assert!(WebhookPayload::from_json(&json!([])).is_err());
        assert!(WebhookPayload::from_json(&json!([7, 1.5, "t"])).is_err());
        assert!(WebhookPayload::from_json(&json!("title")).is_err());
        assert!(WebhookPayload::from_json(&json!(null)).is_err());

        let payload = WebhookPayload::from_json(&json!({"user_id": 7})).unwrap();
        assert_eq!(payload.user_id, 7);
    }
}
