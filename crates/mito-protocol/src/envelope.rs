use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ids::{CorrelationId, StepId};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed envelope: {0}")]
    Malformed(String),
}

/// Closed set of outbound event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Read-only query.
    ApiCall,
    /// Mutates backend state and produces (or overwrites) a step.
    EditEvent,
    /// Non-step mutation such as undo, redo or settings.
    UpdateEvent,
    /// Telemetry; nobody waits for a reply.
    LogEvent,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ApiCall => "api_call",
            EventKind::EditEvent => "edit_event",
            EventKind::UpdateEvent => "update_event",
            EventKind::LogEvent => "log_event",
        }
    }
}

/// Top-level keys the envelope itself owns. Extras never override them.
pub const RESERVED_KEYS: [&str; 5] = ["id", "event", "type", "step_id", "params"];

/// A request envelope that has not been assigned a correlation id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub event: EventKind,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Flat top-level fields some api calls carry (`sheet_index`, `path_parts`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OutboundMessage {
    pub fn new(event: EventKind, kind: impl Into<String>) -> Self {
        Self {
            event,
            kind: kind.into(),
            step_id: None,
            params: None,
            extra: Map::new(),
        }
    }

    pub fn with_step_id(mut self, step_id: StepId) -> Self {
        self.step_id = Some(step_id);
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Adds a flat top-level field. Reserved keys are ignored.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if !is_reserved(&key) {
            self.extra.insert(key, value);
        }
        self
    }

    /// Stamps the correlation id. Extras that collide with envelope keys are
    /// dropped so every frame has exactly one `id`, `event` and `type`.
    pub fn into_envelope(mut self, id: CorrelationId) -> RequestEnvelope {
        self.extra.retain(|key, _| !is_reserved(key));
        RequestEnvelope { id, message: self }
    }
}

fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Outbound frame handed to the host transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: CorrelationId,
    #[serde(flatten)]
    pub message: OutboundMessage,
}

impl RequestEnvelope {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn event(&self) -> EventKind {
        self.message.event
    }

    pub fn kind(&self) -> &str {
        &self.message.kind
    }

    pub fn step_id(&self) -> Option<&StepId> {
        self.message.step_id.as_ref()
    }
}

/// Inbound event kind. Anything the backend invents later is kept as
/// [`ResponseEvent::Unknown`] rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResponseEvent {
    Response,
    EditError,
    Unknown(String),
}

impl From<String> for ResponseEvent {
    fn from(value: String) -> Self {
        match value.as_str() {
            "response" => ResponseEvent::Response,
            "edit_error" => ResponseEvent::EditError,
            _ => ResponseEvent::Unknown(value),
        }
    }
}

impl From<ResponseEvent> for String {
    fn from(value: ResponseEvent) -> Self {
        match value {
            ResponseEvent::Response => "response".to_string(),
            ResponseEvent::EditError => "edit_error".to_string(),
            ResponseEvent::Unknown(other) => other,
        }
    }
}

/// Inbound frame delivered by the host's ingestion hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: CorrelationId,
    pub event: ResponseEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error-descriptor fields (`type`, `header`, `to_fix`, `traceback`) and
    /// anything else the backend attaches.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResponseEnvelope {
    pub fn response(id: impl Into<CorrelationId>, data: Option<Value>) -> Self {
        Self {
            id: id.into(),
            event: ResponseEvent::Response,
            data,
            extra: Map::new(),
        }
    }

    pub fn edit_error(id: impl Into<CorrelationId>, error: &ErrorDescriptor) -> Self {
        let extra = match serde_json::to_value(error) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            event: ResponseEvent::EditError,
            data: None,
            extra,
        }
    }

    /// Validates raw host input. Only an object with a string `id` and a
    /// string `event` is accepted.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(map) = value else {
            return Err(ProtocolError::Malformed("response is not an object".into()));
        };
        match map.get("id") {
            Some(Value::String(id)) if !id.is_empty() => {}
            Some(_) => return Err(ProtocolError::Malformed("response id is not a string".into())),
            None => return Err(ProtocolError::Malformed("response has no id".into())),
        }
        if !matches!(map.get("event"), Some(Value::String(_))) {
            return Err(ProtocolError::Malformed("response has no event".into()));
        }
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// True when `data` carries something a caller can render in place.
    pub fn has_inline_data(&self) -> bool {
        !matches!(self.data, None | Some(Value::Null))
    }

    pub fn is_error(&self) -> bool {
        self.event == ResponseEvent::EditError
    }

    /// Builds the error descriptor for an `edit_error` reply, preferring an
    /// inline `data` object when the backend supplied one.
    pub fn error_descriptor(&self) -> ErrorDescriptor {
        if let Some(data) = self.data.as_ref().filter(|d| ErrorDescriptor::looks_like_error(d)) {
            if let Ok(descriptor) = serde_json::from_value(data.clone()) {
                return descriptor;
            }
        }
        match serde_json::from_value::<ErrorDescriptor>(Value::Object(self.extra.clone())) {
            Ok(descriptor) if !descriptor.header.is_empty() || !descriptor.to_fix.is_empty() => {
                descriptor
            }
            _ => ErrorDescriptor::unknown(),
        }
    }
}

/// Backend business error as shown in the error modal or inline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub to_fix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorDescriptor {
    pub fn new(
        error_type: impl Into<String>,
        header: impl Into<String>,
        to_fix: impl Into<String>,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            header: header.into(),
            to_fix: to_fix.into(),
            traceback: None,
            extra: Map::new(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(
            "unknown_error",
            "Something went wrong",
            "The backend reported an error without details.",
        )
    }

    /// Error payloads are told apart from success payloads by `header` and
    /// `to_fix`.
    pub fn looks_like_error(value: &Value) -> bool {
        match value {
            Value::Object(map) => map.contains_key("header") && map.contains_key("to_fix"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_envelope_flattens_extra_fields() {
        let envelope = OutboundMessage::new(EventKind::ApiCall, "get_dataframe_as_csv")
            .with_field("sheet_index", json!(2))
            .into_envelope(CorrelationId::from("_abc"));
        let value = serde_json::to_value(&envelope).expect("encode");
        assert_eq!(
            value,
            json!({"id": "_abc", "event": "api_call", "type": "get_dataframe_as_csv", "sheet_index": 2})
        );
    }

    #[test]
    fn request_envelope_round_trips_through_bytes() {
        let envelope = OutboundMessage::new(EventKind::EditEvent, "sort_edit")
            .with_step_id(StepId::from("s-1"))
            .with_params(json!({"sheet_index": 0}))
            .into_envelope(CorrelationId::from("_x"));
        let bytes = envelope.encode().expect("encode");
        let decoded = RequestEnvelope::decode(&bytes).expect("decode");
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.step_id().map(StepId::as_str), Some("s-1"));
    }

    #[test]
    fn rejects_responses_without_string_id() {
        assert!(ResponseEnvelope::from_value(json!("nope")).is_err());
        assert!(ResponseEnvelope::from_value(json!({"event": "response"})).is_err());
        assert!(ResponseEnvelope::from_value(json!({"id": 4, "event": "response"})).is_err());
        assert!(ResponseEnvelope::from_value(json!({"id": "_a"})).is_err());
    }

    #[test]
    fn keeps_unknown_events() {
        let envelope =
            ResponseEnvelope::from_value(json!({"id": "_a", "event": "heartbeat"})).expect("decode");
        assert_eq!(envelope.event, ResponseEvent::Unknown("heartbeat".into()));
    }

    #[test]
    fn null_data_is_not_inline() {
        let envelope =
            ResponseEnvelope::from_value(json!({"id": "_a", "event": "edit_error", "data": null}))
                .expect("decode");
        assert!(!envelope.has_inline_data());
    }

    #[test]
    fn error_descriptor_prefers_inline_data() {
        let envelope = ResponseEnvelope::from_value(json!({
            "id": "_a",
            "event": "edit_error",
            "type": "outer",
            "header": "outer header",
            "to_fix": "outer fix",
            "data": {"type": "csv_import", "header": "Bad delimiter", "to_fix": "Pick ';'"}
        }))
        .expect("decode");
        let descriptor = envelope.error_descriptor();
        assert_eq!(descriptor.error_type, "csv_import");
        assert_eq!(descriptor.header, "Bad delimiter");
    }

    #[test]
    fn error_descriptor_falls_back_to_flat_fields() {
        let envelope = ResponseEnvelope::from_value(json!({
            "id": "_a",
            "event": "edit_error",
            "type": "column_exists_error",
            "header": "Column already exists",
            "to_fix": "Pick another name",
            "traceback": "Traceback ..."
        }))
        .expect("decode");
        let descriptor = envelope.error_descriptor();
        assert_eq!(descriptor.error_type, "column_exists_error");
        assert_eq!(descriptor.traceback.as_deref(), Some("Traceback ..."));
    }

    #[test]
    fn bare_edit_errors_get_a_generic_descriptor() {
        let envelope = ResponseEnvelope::from_value(json!({"id": "_a", "event": "edit_error"}))
            .expect("decode");
        assert_eq!(envelope.error_descriptor(), ErrorDescriptor::unknown());
    }

    #[test]
    fn extras_cannot_shadow_envelope_keys() {
        let mut message = OutboundMessage::new(EventKind::ApiCall, "datafiles")
            .with_field("event", json!("edit_event"))
            .with_field("sheet_index", json!(1));
        message.extra.insert("id".into(), json!("_spoof"));
        message.extra.insert("type".into(), json!("undo"));

        let envelope = message.into_envelope(CorrelationId::from("_real"));
        let bytes = envelope.encode().expect("encode");
        let decoded = RequestEnvelope::decode(&bytes).expect("single copy of each key");
        assert_eq!(decoded.id.as_str(), "_real");
        assert_eq!(decoded.event(), EventKind::ApiCall);
        assert_eq!(decoded.kind(), "datafiles");
        assert_eq!(decoded.message.extra.get("sheet_index"), Some(&json!(1)));
        assert_eq!(decoded.message.extra.len(), 1);
    }
}
