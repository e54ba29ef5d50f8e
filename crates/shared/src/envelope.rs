//! The wire envelope exchanged between the relayer and its clients.
//!
//! Every frame on the socket is a JSON object with exactly four fields:
//! `sender`, `action`, `contents` and `timestamp`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sender used for lifecycle notices (connect, disconnect, error).
pub const SYSTEM_SENDER: &str = "system";

/// Kind of an envelope. Closed set; anything else fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Connect,
    Chat,
    Disconnect,
    Error,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Chat => "chat",
            Self::Disconnect => "disconnect",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connect" => Ok(Self::Connect),
            "chat" => Ok(Self::Chat),
            "disconnect" => Ok(Self::Disconnect),
            "error" => Ok(Self::Error),
            other => Err(EnvelopeError::UnknownAction(other.to_string())),
        }
    }
}

/// Errors produced while decoding or encoding an envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The frame is not a JSON object.
    #[error("bad message: {0}")]
    Syntax(String),

    /// A known field carries a value of the wrong JSON type.
    #[error("bad message: field `{field}` must be {expected}, got {found}")]
    MalformedField {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// `action` is a string outside the closed set.
    #[error("bad message: unknown action {0:?}")]
    UnknownAction(String),

    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

impl EnvelopeError {
    /// True for errors caused by the peer's input (as opposed to encoding).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Encode(_))
    }
}

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub sender: String,
    pub action: Action,
    pub contents: String,
    pub timestamp: i64,
}

impl Envelope {
    /// Lifecycle notice from the relayer itself.
    pub fn system(action: Action, contents: impl Into<String>) -> Self {
        Self {
            sender: SYSTEM_SENDER.to_string(),
            action,
            contents: contents.into(),
            timestamp: now_nanos(),
        }
    }

    /// Chat message attributed to `sender`.
    pub fn chat(sender: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            action: Action::Chat,
            contents: contents.into(),
            timestamp: now_nanos(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.sender == SYSTEM_SENDER
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a frame, checking the type of every field that is present.
    ///
    /// Absent or `null` fields take their defaults: empty strings, `chat`
    /// and a zero timestamp.
    pub fn from_json(text: &str) -> Result<Self, EnvelopeError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| EnvelopeError::Syntax(e.to_string()))?;
        let fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(EnvelopeError::Syntax(format!(
                    "expected a JSON object, got {}",
                    type_name(&other)
                )))
            }
        };

        let sender = string_field(&fields, "sender")?.unwrap_or_default();
        let action = match string_field(&fields, "action")? {
            Some(s) => s.parse()?,
            None => Action::Chat,
        };
        let contents = string_field(&fields, "contents")?.unwrap_or_default();
        let timestamp = match fields.get("timestamp") {
            None | Some(Value::Null) => 0,
            Some(v @ Value::Number(n)) => n.as_i64().ok_or(EnvelopeError::MalformedField {
                field: "timestamp",
                expected: "an integer",
                found: type_name(v),
            })?,
            Some(v) => {
                return Err(EnvelopeError::MalformedField {
                    field: "timestamp",
                    expected: "an integer",
                    found: type_name(v),
                })
            }
        };

        Ok(Self {
            sender,
            action,
            contents,
            timestamp,
        })
    }
}

fn string_field(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, EnvelopeError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(v) => Err(EnvelopeError::MalformedField {
            field,
            expected: "a string",
            found: type_name(v),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() => "integer",
        Value::Number(n) if n.is_u64() => "out-of-range integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Wall-clock nanoseconds since the Unix epoch.
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip_keeps_every_field() {
        for env in [
            Envelope::system(Action::Connect, "3f1c"),
            Envelope::chat("3f1c", "hello \"world\" ✓"),
            Envelope::system(Action::Disconnect, ""),
            Envelope::system(Action::Error, "bad message"),
        ] {
            let json = env.to_json().unwrap();
            let parsed = Envelope::from_json(&json).unwrap();
            assert_eq!(parsed, env);
        }
    }

    #[test]
    fn serialized_envelope_has_exactly_the_wire_fields() {
        let env = Envelope::chat("abc", "hi");
        let value: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        let obj = value.as_object().unwrap();
        let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, ["action", "contents", "sender", "timestamp"]);
        assert_eq!(obj["action"], "chat");
        assert!(obj["timestamp"].is_i64());
    }

    #[test]
    fn system_constructor_sets_sender() {
        let env = Envelope::system(Action::Connect, "id-1");
        assert!(env.is_system());
        assert_eq!(env.sender, SYSTEM_SENDER);
        assert_eq!(env.contents, "id-1");
        assert!(env.timestamp > 0);
    }

    #[test]
    fn numeric_sender_is_malformed_field() {
        let err = Envelope::from_json(
            r#"{"sender": 5, "action": "chat", "contents": "hi", "timestamp": 1}"#,
        )
        .unwrap_err();
        match err {
            EnvelopeError::MalformedField { field, found, .. } => {
                assert_eq!(field, "sender");
                assert_eq!(found, "integer");
            }
            other => panic!("expected MalformedField, got {other:?}"),
        }
    }

    #[test]
    fn float_timestamp_is_malformed_field() {
        let err = Envelope::from_json(r#"{"contents": "hi", "timestamp": 1.5}"#).unwrap_err();
        assert!(matches!(
            err,
            EnvelopeError::MalformedField {
                field: "timestamp",
                found: "float",
                ..
            }
        ));
    }

    #[test]
    fn non_json_is_syntax_error() {
        let err = Envelope::from_json("not json at all").unwrap_err();
        assert!(matches!(err, EnvelopeError::Syntax(_)));
        assert!(err.is_client_error());

        let err = Envelope::from_json("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, EnvelopeError::Syntax(_)));
    }

    #[test]
    fn unknown_action_is_rejected_eagerly() {
        let err = Envelope::from_json(r#"{"action": "shout", "contents": "hi"}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::UnknownAction(ref a) if a == "shout"));
    }

    #[test]
    fn absent_and_null_fields_take_defaults() {
        let env = Envelope::from_json(r#"{"contents": "hi", "sender": null}"#).unwrap();
        assert_eq!(env.sender, "");
        assert_eq!(env.action, Action::Chat);
        assert_eq!(env.contents, "hi");
        assert_eq!(env.timestamp, 0);

        let env = Envelope::from_json("{}").unwrap();
        assert_eq!(env.contents, "");
    }

    #[test]
    fn action_parses_every_wire_name() {
        for action in [
            Action::Connect,
            Action::Chat,
            Action::Disconnect,
            Action::Error,
        ] {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action));
        }
    }
}
