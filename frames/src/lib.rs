//! Protobuf codecs shared by the daemon, its helper protocol, and the CLI.
//!
//! TRANSPORTS
//! ==========
//! - Broker RPC: one [`Frame`] per binary WebSocket message, via
//!   [`encode_frame`]/[`decode_frame`].
//! - Helper IPC: `Start`/`SetResult` bodies are a bare
//!   `google.protobuf.Struct`, via [`encode_struct`]/[`decode_struct`]. The
//!   `ipc` crate adds the length prefix and opcode around them.
//!
//! Both carry request parameters as a JSON object, so one value mapping
//! serves both.
//!
//! NUMBERS
//! =======
//! `google.protobuf.Value` carries every number as a double. Decoding turns
//! integral doubles within ±2^53 back into JSON integers so window handles,
//! identities and error codes survive the trip unchanged. Non-finite numbers
//! decode as `null`.

use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Largest magnitude below which every integer is exactly representable as `f64`.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed protobuf payload: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("invalid frame status: {0}")]
    InvalidStatus(i32),
}

/// Where a frame sits in a request/reply exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// A broker call, or a daemon notification such as
    /// `indicator:properties_changed`.
    Request,
    Done,
    Error,
    Cancel,
}

impl Status {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        let wire = match self {
            Self::Request => WireFrameStatus::Request,
            Self::Done => WireFrameStatus::Done,
            Self::Error => WireFrameStatus::Error,
            Self::Cancel => WireFrameStatus::Cancel,
        };
        wire as i32
    }

    fn from_i32(value: i32) -> Result<Self, CodecError> {
        match WireFrameStatus::try_from(value) {
            Ok(WireFrameStatus::Request) => Ok(Self::Request),
            Ok(WireFrameStatus::Done) => Ok(Self::Done),
            Ok(WireFrameStatus::Error) => Ok(Self::Error),
            Ok(WireFrameStatus::Cancel) => Ok(Self::Cancel),
            Err(_) => Err(CodecError::InvalidStatus(value)),
        }
    }
}

/// One broker RPC message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// UUID string chosen by the sender.
    pub id: String,
    /// The request this frame answers; `None` on requests and notifications.
    pub parent_id: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub ts: i64,
    pub from: Option<String>,
    /// `prefix:op`, e.g. `"ui:query_dialog"`.
    pub syscall: String,
    pub status: Status,
    /// Request parameters or reply map.
    pub data: Value,
}

// =============================================================================
// FRAMES
// =============================================================================

#[must_use]
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let wire = WireFrame {
        id: frame.id.clone(),
        parent_id: frame.parent_id.clone(),
        ts: frame.ts,
        from: frame.from.clone(),
        syscall: frame.syscall.clone(),
        status: frame.status.as_i32(),
        data: Some(to_proto(&frame.data)),
    };
    wire.encode_to_vec()
}

/// # Errors
///
/// [`CodecError::Decode`] for malformed bytes and
/// [`CodecError::InvalidStatus`] for an unknown status value.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, CodecError> {
    let wire = WireFrame::decode(bytes)?;
    Ok(Frame {
        status: Status::from_i32(wire.status)?,
        data: wire.data.as_ref().map_or_else(|| Value::Object(Map::new()), from_proto),
        id: wire.id,
        parent_id: wire.parent_id,
        ts: wire.ts,
        from: wire.from,
        syscall: wire.syscall,
    })
}

// =============================================================================
// STRUCT PAYLOADS
// =============================================================================

/// Encode a parameter map as `google.protobuf.Struct` bytes. An empty map
/// encodes to zero bytes.
#[must_use]
pub fn encode_struct(map: &Map<String, Value>) -> Vec<u8> {
    map_to_struct(map).encode_to_vec()
}

/// Decode `google.protobuf.Struct` bytes. Zero bytes decode to an empty map.
///
/// # Errors
///
/// [`CodecError::Decode`] for malformed bytes.
pub fn decode_struct(bytes: &[u8]) -> Result<Map<String, Value>, CodecError> {
    let decoded = prost_types::Struct::decode(bytes)?;
    Ok(struct_to_map(&decoded))
}

// =============================================================================
// VALUE MAPPING
// =============================================================================

fn map_to_struct(map: &Map<String, Value>) -> prost_types::Struct {
    prost_types::Struct { fields: map.iter().map(|(k, v)| (k.clone(), to_proto(v))).collect() }
}

fn struct_to_map(value: &prost_types::Struct) -> Map<String, Value> {
    value.fields.iter().map(|(k, v)| (k.clone(), from_proto(v))).collect()
}

fn to_proto(value: &Value) -> prost_types::Value {
    use prost_types::value::Kind;

    let kind = match value {
        Value::Null => Kind::NullValue(prost_types::NullValue::NullValue as i32),
        Value::Bool(v) => Kind::BoolValue(*v),
        Value::Number(v) => Kind::NumberValue(v.as_f64().unwrap_or(0.0)),
        Value::String(v) => Kind::StringValue(v.clone()),
        Value::Array(v) => Kind::ListValue(prost_types::ListValue { values: v.iter().map(to_proto).collect() }),
        Value::Object(v) => Kind::StructValue(map_to_struct(v)),
    };
    prost_types::Value { kind: Some(kind) }
}

fn from_proto(value: &prost_types::Value) -> Value {
    use prost_types::value::Kind;

    match &value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::NumberValue(v)) => number_to_json(*v),
        Some(Kind::StringValue(v)) => Value::String(v.clone()),
        Some(Kind::BoolValue(v)) => Value::Bool(*v),
        Some(Kind::StructValue(v)) => Value::Object(struct_to_map(v)),
        Some(Kind::ListValue(v)) => Value::Array(v.values.iter().map(from_proto).collect()),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn number_to_json(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() <= MAX_SAFE_INTEGER {
        return Value::from(v as i64);
    }
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Clone, PartialEq, Message)]
struct WireFrame {
    #[prost(string, tag = "1")]
    id: String,
    #[prost(string, optional, tag = "2")]
    parent_id: Option<String>,
    #[prost(int64, tag = "3")]
    ts: i64,
    #[prost(string, optional, tag = "5")]
    from: Option<String>,
    #[prost(string, tag = "6")]
    syscall: String,
    #[prost(enumeration = "WireFrameStatus", tag = "7")]
    status: i32,
    #[prost(message, optional, tag = "8")]
    data: Option<prost_types::Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
enum WireFrameStatus {
    Request = 0,
    Done = 1,
    Error = 2,
    Cancel = 3,
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
