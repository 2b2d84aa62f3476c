//! Message protocol definitions
//!
//! Inbound frames are JSON objects with arbitrary keys. Every scalar value
//! is normalized to text before dispatch, so a payload is a flat
//! `name -> text` mapping that is re-serialized verbatim on broadcast.
//! System notifications use the three-field `Envelope`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;
use crate::types::{ConnectionId, RoomName};

/// Key naming the requested action
pub const EVENT_KEY: &str = "event";
/// Key naming the target room
pub const ROOM_KEY: &str = "room";

/// A decoded field value before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Text(String),
    Null,
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Convert a JSON value, `None` for arrays and objects
    ///
    /// Every JSON number is a float on the wire, so `2` renders as
    /// `2.000000`. `Integer` only comes from values built in Rust.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(b)),
            Value::Number(n) => n.as_f64().map(Self::Float),
            Value::String(s) => Some(Self::Text(s)),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Render the value as text
    ///
    /// Floats use fixed notation with 6 decimals, booleans their literal,
    /// null the empty string.
    pub fn normalize(self) -> String {
        match self {
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => format!("{:.6}", f),
            Self::Bool(b) => b.to_string(),
            Self::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Self::Text(s) => s,
            Self::Null => String::new(),
            Self::Timestamp(ts) => format_timestamp(ts),
        }
    }
}

/// `2006-01-02 15:04:05.5 +0000 UTC`: the fraction has no trailing zeros
/// and is omitted when zero
fn format_timestamp(ts: DateTime<Utc>) -> String {
    let mut text = ts.format("%Y-%m-%d %H:%M:%S").to_string();
    let nanos = ts.timestamp_subsec_nanos();
    if nanos > 0 {
        let fraction = format!("{:09}", nanos);
        text.push('.');
        text.push_str(fraction.trim_end_matches('0'));
    }
    text.push_str(" +0000 UTC");
    text
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Normalized message: every value is text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, String>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a frame body into a normalized payload
    ///
    /// # Errors
    /// Fails when the body is not a JSON object
    pub fn decode(bytes: &[u8]) -> Result<Self, AppError> {
        let fields: serde_json::Map<String, Value> = serde_json::from_slice(bytes)?;
        let normalized = fields
            .into_iter()
            .filter_map(|(key, value)| FieldValue::from_json(value).map(|v| (key, v.normalize())))
            .collect();
        Ok(Self(normalized))
    }

    /// Insert a field, normalizing its value
    pub fn insert(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.0.insert(key.into(), value.into().normalize());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decide what the connection should do with this payload
    pub fn into_action(self) -> Action {
        let Some(room) = self.get(ROOM_KEY).map(RoomName::from) else {
            return Action::Ignore;
        };
        match self.get(EVENT_KEY) {
            Some("join") => return Action::Join(room),
            Some("leave") => return Action::Leave(room),
            _ => {}
        }
        Action::Broadcast(room, self)
    }
}

/// Action requested by an inbound payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Join a room, creating it if needed
    Join(RoomName),
    /// Leave a joined room
    Leave(RoomName),
    /// Forward the payload to every member of an existing room
    Broadcast(RoomName, Payload),
    /// No `room` key, nothing to do
    Ignore,
}

/// Membership notification event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeEvent {
    Join,
    Leave,
}

/// Server-generated `{room, event, payload}` notification
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<'a> {
    pub room: &'a str,
    pub event: EnvelopeEvent,
    pub payload: String,
}

impl<'a> Envelope<'a> {
    pub fn join(room: &'a RoomName, id: ConnectionId) -> Self {
        Self {
            room: room.as_str(),
            event: EnvelopeEvent::Join,
            payload: id.to_string(),
        }
    }

    pub fn leave(room: &'a RoomName, id: ConnectionId) -> Self {
        Self {
            room: room.as_str(),
            event: EnvelopeEvent::Leave,
            payload: id.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_normalize_scalars() {
        assert_eq!(FieldValue::Integer(42).normalize(), "42");
        assert_eq!(FieldValue::Float(1.5).normalize(), "1.500000");
        assert_eq!(FieldValue::Float(-0.25).normalize(), "-0.250000");
        assert_eq!(FieldValue::Bool(true).normalize(), "true");
        assert_eq!(FieldValue::Bool(false).normalize(), "false");
        assert_eq!(FieldValue::Null.normalize(), "");
        assert_eq!(FieldValue::Bytes(b"raw".to_vec()).normalize(), "raw");
        assert_eq!(FieldValue::Text("hi".to_string()).normalize(), "hi");
    }

    #[test]
    fn test_normalize_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            FieldValue::Timestamp(ts).normalize(),
            "2024-01-02 03:04:05 +0000 UTC"
        );
    }

    #[test]
    fn test_normalize_timestamp_trims_fraction() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let half = ts.with_nanosecond(500_000_000).unwrap();
        assert_eq!(
            FieldValue::Timestamp(half).normalize(),
            "2024-01-02 03:04:05.5 +0000 UTC"
        );

        let fine = ts.with_nanosecond(120_034_000).unwrap();
        assert_eq!(
            FieldValue::Timestamp(fine).normalize(),
            "2024-01-02 03:04:05.120034 +0000 UTC"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let values = vec![
            FieldValue::Integer(-7),
            FieldValue::Float(3.14159265),
            FieldValue::Bool(true),
            FieldValue::Null,
            FieldValue::Bytes(vec![0x68, 0x69]),
            FieldValue::Timestamp(Utc.with_ymd_and_hms(2020, 5, 6, 7, 8, 9).unwrap()),
        ];
        for value in values {
            let once = value.normalize();
            let twice = FieldValue::Text(once.clone()).normalize();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_decode_normalizes_json_values() {
        let json = br#"{"room":"lobby","n":3,"x":2.5,"ok":false,"none":null,"big":1e3}"#;
        let payload = Payload::decode(json).unwrap();
        assert_eq!(payload.get("room"), Some("lobby"));
        assert_eq!(payload.get("n"), Some("3.000000"));
        assert_eq!(payload.get("x"), Some("2.500000"));
        assert_eq!(payload.get("ok"), Some("false"));
        assert_eq!(payload.get("none"), Some(""));
        assert_eq!(payload.get("big"), Some("1000.000000"));
    }

    #[test]
    fn test_decode_drops_nested_values() {
        let payload = Payload::decode(br#"{"room":"a","list":[1,2],"obj":{"k":1}}"#).unwrap();
        assert_eq!(payload.to_json().unwrap(), r#"{"room":"a"}"#);
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(Payload::decode(b"not json").is_err());
        assert!(Payload::decode(b"[1,2,3]").is_err());
        assert!(Payload::decode(b"\"text\"").is_err());
    }

    #[test]
    fn test_action_dispatch() {
        let join = Payload::decode(br#"{"event":"join","room":"lobby"}"#).unwrap();
        assert_eq!(join.into_action(), Action::Join(RoomName::from("lobby")));

        let leave = Payload::decode(br#"{"event":"leave","room":"lobby"}"#).unwrap();
        assert_eq!(leave.into_action(), Action::Leave(RoomName::from("lobby")));

        let chat = Payload::decode(br#"{"room":"lobby","text":"hi"}"#).unwrap();
        match chat.clone().into_action() {
            Action::Broadcast(room, payload) => {
                assert_eq!(room.as_str(), "lobby");
                assert_eq!(payload, chat);
            }
            other => panic!("Wrong action: {:?}", other),
        }

        let custom = Payload::decode(br#"{"event":"custom","room":"lobby"}"#).unwrap();
        assert!(matches!(custom.into_action(), Action::Broadcast(..)));
    }

    #[test]
    fn test_action_without_room_is_ignored() {
        for json in [
            r#"{"event":"join"}"#,
            r#"{"event":"leave"}"#,
            r#"{"text":"hi"}"#,
            r#"{}"#,
        ] {
            let payload = Payload::decode(json.as_bytes()).unwrap();
            assert_eq!(payload.into_action(), Action::Ignore);
        }
    }

    #[test]
    fn test_numeric_room_name() {
        let payload = Payload::decode(br#"{"event":"join","room":5}"#).unwrap();
        assert_eq!(payload.into_action(), Action::Join(RoomName::from("5.000000")));
    }

    #[test]
    fn test_wire_numbers_render_as_floats() {
        let payload = Payload::decode(br#"{"room":5,"n":2,"neg":-7,"text":"hi"}"#).unwrap();
        assert_eq!(
            payload.to_json().unwrap(),
            r#"{"n":"2.000000","neg":"-7.000000","room":"5.000000","text":"hi"}"#
        );
    }

    #[test]
    fn test_payload_builder() {
        let payload = Payload::new()
            .insert("room", "lobby")
            .insert("count", 2i64)
            .insert("ratio", 0.5)
            .insert("missing", None::<String>);
        let json = payload.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"count":"2","missing":"","ratio":"0.500000","room":"lobby"}"#
        );
    }

    #[test]
    fn test_envelope_serialize() {
        let room = RoomName::from("lobby");
        let id = ConnectionId::new();
        let json = Envelope::join(&room, id).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["room"], "lobby");
        assert_eq!(value["event"], "join");
        assert_eq!(value["payload"], id.to_string());
        assert_eq!(value.as_object().unwrap().len(), 3);

        let json = Envelope::leave(&room, id).to_json().unwrap();
        assert!(json.contains("\"event\":\"leave\""));
    }
}
