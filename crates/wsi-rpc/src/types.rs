//! Wire-format types.
//!
//! Inbound: `{ "method": string, "id"?: any, "authorization"?: string, ...fields }`.
//! Outbound: [`ResponseFrame`] `{ "id"?, "response" }` or [`ErrorFrame`] `{ "id"?, "error" }`.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::auth::Claims;
use crate::responder::Responder;

/// The `method` member of an inbound object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MethodField {
    /// A non-empty string; looked up in the registry.
    Name(String),
    /// Any other truthy value, rendered as text for the not-found reply.
    Other(String),
}

impl MethodField {
    /// Classify a raw `method` value. `None` when it is absent or falsy
    /// (`null`, `false`, `0`, `""`).
    pub fn from_value(value: Option<Value>) -> Option<Self> {
        match value? {
            Value::String(s) if !s.is_empty() => Some(Self::Name(s)),
            other if is_truthy(&other) => Some(Self::Other(display_text(&other))),
            _ => None,
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text form of a JSON value: arrays join their elements with `,`, nulls
/// inside arrays are blank, objects print as `[object Object]`.
fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_text(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display_text).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_owned(),
    }
}

/// Integral floats print without a fractional part (`5.0` → `5`).
fn number_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.0}"),
        _ => n.to_string(),
    }
}

/// Envelope members of an inbound frame, extracted before routing.
///
/// Parsing is lenient: any valid JSON is accepted, and members that are
/// missing or unusable come back as `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Inbound {
    /// The `method` member, unless absent or falsy.
    pub method: Option<MethodField>,
    /// Correlation id (any non-null JSON value).
    pub id: Option<Value>,
    /// Non-empty string `authorization`, if present.
    pub authorization: Option<String>,
    /// Every other member of the object.
    pub fields: Map<String, Value>,
}

impl Inbound {
    /// Parse raw frame text. Fails only when the text is not JSON.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_value(value))
    }

    /// Extract envelope members from an already-parsed value.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut fields) = value else {
            return Self::default();
        };

        let method = MethodField::from_value(fields.remove("method"));
        let id = fields.remove("id").filter(|v| !v.is_null());
        let authorization = match fields.remove("authorization") {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        };

        Self {
            method,
            id,
            authorization,
            fields,
        }
    }
}

/// A routed request handed to a method handler.
///
/// Carries the [`Responder`] of the connection it arrived on, so replies
/// always go back to that connection.
pub struct Request {
    /// Registered method name.
    pub method: String,
    /// Correlation id echoed in replies.
    pub id: Option<Value>,
    /// Raw signed token as sent by the client.
    pub authorization: Option<String>,
    /// Decoded claims; set only after successful verification.
    pub token: Option<Claims>,
    /// Method-specific members of the inbound object.
    pub fields: Map<String, Value>,
    responder: Responder,
}

impl Request {
    /// Create a request with no id, token or fields.
    pub fn new(method: impl Into<String>, responder: Responder) -> Self {
        Self {
            method: method.into(),
            id: None,
            authorization: None,
            token: None,
            fields: Map::new(),
            responder,
        }
    }

    /// Build a request from a parsed envelope whose method was resolved.
    pub fn from_inbound(method: String, inbound: Inbound, responder: Responder) -> Self {
        Self {
            method,
            id: inbound.id,
            authorization: inbound.authorization,
            token: None,
            fields: inbound.fields,
            responder,
        }
    }

    /// Set the correlation id.
    #[must_use]
    pub fn with_id(mut self, id: Value) -> Self {
        self.id = Some(id);
        self
    }

    /// Set a method-specific field.
    #[must_use]
    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        let _ = self.fields.insert(name.to_owned(), value);
        self
    }

    /// The responder bound to the originating connection.
    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    /// Id of the originating connection.
    pub fn connection_id(&self) -> &str {
        self.responder.connection_id()
    }

    /// Raw method-specific field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Method-specific field deserialized as `T`; `None` if missing or mistyped.
    pub fn field_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.fields
            .get(name)
            .and_then(|v| T::deserialize(v).ok())
    }

    /// Send `{id?, response: value}` to the originating connection.
    pub fn reply(&self, value: impl Serialize) -> bool {
        self.responder.send(Some(self), value)
    }

    /// Send `{id?, error: message}` to the originating connection.
    pub fn reply_error(&self, message: &str) -> bool {
        self.responder.send_error(Some(self), message)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("id", &self.id)
            .field("authorization", &self.authorization.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token)
            .field("fields", &self.fields)
            .field("connection", &self.connection_id())
            .finish()
    }
}

/// Successful reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame<T = Value> {
    /// Correlation id copied from the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Handler result.
    pub response: T,
}

/// Error reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// Correlation id copied from the request, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Human-readable message.
    pub error: String,
}

/// Either outbound frame, for clients reading the stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    /// `{id?, response}`.
    Response(ResponseFrame),
    /// `{id?, error}`.
    Error(ErrorFrame),
}

impl Frame {
    /// Parse frame text received from the server.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Correlation id of either variant.
    pub fn id(&self) -> Option<&Value> {
        match self {
            Self::Response(r) => r.id.as_ref(),
            Self::Error(e) => e.id.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingSink;
    use serde_json::json;

    #[test]
    fn parse_full_envelope() {
        let inbound =
            Inbound::parse(r#"{"method":"user.get","id":7,"authorization":"tok","userId":3}"#)
                .unwrap();
        assert_eq!(inbound.method, Some(MethodField::Name("user.get".into())));
        assert_eq!(inbound.id, Some(json!(7)));
        assert_eq!(inbound.authorization.as_deref(), Some("tok"));
        assert_eq!(inbound.fields.len(), 1);
        assert_eq!(inbound.fields["userId"], 3);
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(Inbound::parse("not json").is_err());
        assert!(Inbound::parse("").is_err());
    }

    #[test]
    fn non_object_values_have_no_members() {
        for raw in ["null", "5", "\"ping\"", "[1,2]", "true"] {
            assert_eq!(Inbound::parse(raw).unwrap(), Inbound::default(), "{raw}");
        }
    }

    #[test]
    fn absent_or_falsy_method_is_none() {
        for raw in [
            r#"{"id":1}"#,
            r#"{"method":null}"#,
            r#"{"method":""}"#,
            r#"{"method":false}"#,
            r#"{"method":0}"#,
            r#"{"method":0.0}"#,
        ] {
            assert!(Inbound::parse(raw).unwrap().method.is_none(), "{raw}");
        }
    }

    #[test]
    fn non_string_method_keeps_its_text_form() {
        let cases = [
            (r#"{"method":5}"#, "5"),
            (r#"{"method":-2.5}"#, "-2.5"),
            (r#"{"method":3.0}"#, "3"),
            (r#"{"method":true}"#, "true"),
            (r#"{"method":["a",1,null]}"#, "a,1,"),
            (r#"{"method":[]}"#, ""),
            (r#"{"method":{"name":"x"}}"#, "[object Object]"),
        ];
        for (raw, text) in cases {
            assert_eq!(
                Inbound::parse(raw).unwrap().method,
                Some(MethodField::Other(text.into())),
                "{raw}"
            );
        }
    }

    #[test]
    fn null_id_is_absent_but_falsy_ids_are_kept() {
        assert!(Inbound::parse(r#"{"method":"a","id":null}"#).unwrap().id.is_none());
        assert_eq!(Inbound::parse(r#"{"method":"a","id":0}"#).unwrap().id, Some(json!(0)));
        assert_eq!(Inbound::parse(r#"{"method":"a","id":""}"#).unwrap().id, Some(json!("")));
    }

    #[test]
    fn non_string_authorization_is_absent() {
        let inbound = Inbound::parse(r#"{"method":"a","authorization":42}"#).unwrap();
        assert!(inbound.authorization.is_none());
        assert!(!inbound.fields.contains_key("authorization"));
    }

    #[test]
    fn response_frame_omits_missing_id() {
        let frame = ResponseFrame {
            id: None,
            response: json!("pong"),
        };
        assert_eq!(serde_json::to_string(&frame).unwrap(), r#"{"response":"pong"}"#);
    }

    #[test]
    fn error_frame_shape() {
        let frame = ErrorFrame {
            id: Some(json!(2)),
            error: "Authorization Required".into(),
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"id": 2, "error": "Authorization Required"})
        );
    }

    #[test]
    fn frame_parse_distinguishes_variants() {
        let ok = Frame::parse(r#"{"id":"abc","response":null}"#).unwrap();
        assert!(matches!(ok, Frame::Response(ref r) if r.response.is_null()));
        assert_eq!(ok.id(), Some(&json!("abc")));

        let err = Frame::parse(r#"{"error":"No method supplied"}"#).unwrap();
        assert!(matches!(err, Frame::Error(ref e) if e.error == "No method supplied"));
        assert!(err.id().is_none());
    }

    #[test]
    fn request_field_access() {
        let sink = RecordingSink::new("conn_t");
        let req = Request::new("echo", sink.responder())
            .with_field("count", json!(3))
            .with_field("name", json!("ada"));
        assert_eq!(req.field_as::<u32>("count"), Some(3));
        assert_eq!(req.field_as::<String>("name").as_deref(), Some("ada"));
        assert_eq!(req.field_as::<u32>("name"), None);
        assert!(req.field("missing").is_none());
        assert_eq!(req.connection_id(), "conn_t");
    }

    #[test]
    fn debug_redacts_authorization() {
        let sink = RecordingSink::new("conn_t");
        let mut req = Request::new("secure", sink.responder());
        req.authorization = Some("eyJ.secret.sig".into());
        let dbg = format!("{req:?}");
        assert!(!dbg.contains("eyJ.secret.sig"));
        assert!(dbg.contains("conn_t"));
    }
}
