//! Call envelopes and reply frames, and their JSON encoding inside frames.
//!
//! ```text
//! CALL   {"method":"Arith.Thrive","seq":3,"args":{...}}
//! REPLY  {"seq":3,"index":0,"payload":{...},"final":false}
//! REPLY  {"seq":3,"index":5,"final":true}                      stream done
//! REPLY  {"seq":3,"index":2,"final":true,"error":"..."}        call failed
//! ```

use rpcprims_frame::{Frame, FrameKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RpcError};

/// One incoming call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    /// Fully qualified method name, `Service.Method`.
    pub method: String,
    /// Caller-chosen id echoed on every reply of this call.
    pub seq: u64,
    /// Argument payload, decoded against the method's argument type.
    #[serde(default)]
    pub args: Value,
}

/// One outgoing reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub seq: u64,
    /// Position within the call, starting at 0. Terminal frames carry the
    /// number of data frames sent before them.
    pub index: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(rename = "final")]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplyFrame {
    /// A non-terminal stream value.
    pub fn data(seq: u64, index: u64, payload: Value) -> Self {
        Self {
            seq,
            index,
            payload: Some(payload),
            is_final: false,
            error: None,
        }
    }

    /// The single reply of a successful unary call.
    pub fn unary(seq: u64, payload: Value) -> Self {
        Self {
            seq,
            index: 0,
            payload: Some(payload),
            is_final: true,
            error: None,
        }
    }

    /// Terminal frame of a successful stream.
    pub fn success(seq: u64, index: u64) -> Self {
        Self {
            seq,
            index,
            payload: None,
            is_final: true,
            error: None,
        }
    }

    /// Terminal frame of a failed call.
    pub fn failure(seq: u64, index: u64, message: impl Into<String>) -> Self {
        Self {
            seq,
            index,
            payload: None,
            is_final: true,
            error: Some(message.into()),
        }
    }
}

impl CallEnvelope {
    pub fn new(method: impl Into<String>, seq: u64, args: Value) -> Self {
        Self {
            method: method.into(),
            seq,
            args,
        }
    }
}

pub fn encode_call(call: &CallEnvelope) -> Result<Frame> {
    Ok(Frame::call(serde_json::to_vec(call)?))
}

pub fn decode_call(frame: &Frame) -> Result<CallEnvelope> {
    expect_kind(frame, FrameKind::Call)?;
    serde_json::from_slice(&frame.payload)
        .map_err(|err| RpcError::Protocol(format!("malformed call envelope: {err}")))
}

pub fn encode_reply(reply: &ReplyFrame) -> Result<Frame> {
    Ok(Frame::reply(serde_json::to_vec(reply)?))
}

pub fn decode_reply(frame: &Frame) -> Result<ReplyFrame> {
    expect_kind(frame, FrameKind::Reply)?;
    serde_json::from_slice(&frame.payload)
        .map_err(|err| RpcError::Protocol(format!("malformed reply frame: {err}")))
}

fn expect_kind(frame: &Frame, kind: FrameKind) -> Result<()> {
    if frame.kind == kind {
        return Ok(());
    }
    Err(RpcError::Protocol(format!(
        "expected {kind} frame, got {}",
        frame.kind
    )))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn call_wire_shape() {
        let call = CallEnvelope::new("Arith.Multiply", 9, json!({"A": 6, "B": 7}));
        let frame = encode_call(&call).unwrap();

        assert_eq!(frame.kind, FrameKind::Call);
        let value: Value = serde_json::from_slice(&frame.payload).unwrap();
        assert_eq!(
            value,
            json!({"method": "Arith.Multiply", "seq": 9, "args": {"A": 6, "B": 7}})
        );
        assert_eq!(decode_call(&frame).unwrap(), call);
    }

    #[test]
    fn call_without_args_decodes_to_null() {
        let frame = Frame::call(r#"{"method":"Arith.Sleep","seq":1}"#);
        let call = decode_call(&frame).unwrap();
        assert_eq!(call.args, Value::Null);
    }

    #[test]
    fn terminal_frames_omit_payload() {
        let ok = encode_reply(&ReplyFrame::success(4, 5)).unwrap();
        let value: Value = serde_json::from_slice(&ok.payload).unwrap();
        assert_eq!(value, json!({"seq": 4, "index": 5, "final": true}));

        let failed = encode_reply(&ReplyFrame::failure(4, 2, "boom")).unwrap();
        let value: Value = serde_json::from_slice(&failed.payload).unwrap();
        assert_eq!(
            value,
            json!({"seq": 4, "index": 2, "final": true, "error": "boom"})
        );
    }

    #[test]
    fn data_frame_roundtrip() {
        let reply = ReplyFrame::data(2, 3, json!({"C": 1, "Index": 3}));
        let decoded = decode_reply(&encode_reply(&reply).unwrap()).unwrap();
        assert_eq!(decoded, reply);
        assert!(!decoded.is_final);
    }

    #[test]
    fn wrong_kind_is_protocol_violation() {
        let frame = Frame::reply(r#"{"method":"Arith.Multiply","seq":1}"#);
        let err = decode_call(&frame).unwrap_err();
        assert!(matches!(err, RpcError::Protocol(msg) if msg.contains("expected CALL")));
    }

    #[test]
    fn garbage_envelope_is_protocol_violation() {
        let frame = Frame::call("not json");
        assert!(matches!(decode_call(&frame), Err(RpcError::Protocol(_))));

        let frame = Frame::call(r#"{"seq":1}"#);
        assert!(matches!(decode_call(&frame), Err(RpcError::Protocol(_))));
    }
}
