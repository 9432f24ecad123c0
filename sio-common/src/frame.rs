//! Frame codec for the Socket.IO 1.x text protocol
//!
//! Wire format: `type:[id][+]:[endpoint]:[data]`. Only the first three
//! separators delimit fields; the data segment may contain colons.

use serde_json::Value;
use std::fmt::Write;

use crate::error::{ProtocolParseError, ProtocolResult};
use crate::types::{Frame, FrameType, MessageId, Packet};

/// Decode one transport text message into a [`Frame`].
pub fn decode(text: &str) -> ProtocolResult<Frame> {
    let (type_segment, rest) = text
        .split_once(':')
        .ok_or_else(|| malformed("missing type separator"))?;
    let frame_type = decode_type(type_segment)?;

    let (id_segment, rest) = rest
        .split_once(':')
        .ok_or_else(|| malformed("missing id separator"))?;
    let (id, ack_requested) = decode_id(id_segment)?;

    let (endpoint, data) = rest.split_once(':').unwrap_or((rest, ""));
    let packet = decode_packet(frame_type, data)?;

    Ok(Frame {
        id,
        ack_requested,
        endpoint: endpoint.to_string(),
        packet,
    })
}

/// Encode a [`Frame`] into its transport text form.
pub fn encode(frame: &Frame) -> String {
    let mut out = String::with_capacity(16);
    let _ = write!(out, "{}:", frame.frame_type().as_digit());
    if let Some(id) = frame.id {
        let _ = write!(out, "{}", id);
        if frame.ack_requested {
            out.push('+');
        }
    }
    out.push(':');
    out.push_str(&frame.endpoint);

    match &frame.packet {
        Packet::Disconnect | Packet::Connect | Packet::Heartbeat => {}
        Packet::Message(text) | Packet::JsonMessage(text) | Packet::Noop(text) => {
            out.push(':');
            out.push_str(text);
        }
        Packet::Event { name, args } => {
            let _ = write!(
                out,
                ":{{\"name\":{},\"args\":{}}}",
                Value::from(name.as_str()),
                json_array(args)
            );
        }
        Packet::Ack { ack_id, args } => {
            let _ = write!(out, ":{}", ack_id);
            if let Some(args) = args {
                out.push('+');
                out.push_str(&json_array(args));
            }
        }
        Packet::Error { reason, advice } => {
            out.push(':');
            out.push_str(reason);
            if !advice.is_empty() {
                out.push('+');
                out.push_str(advice);
            }
        }
    }

    out
}

fn malformed(reason: &str) -> ProtocolParseError {
    ProtocolParseError::Malformed(reason.to_string())
}

fn decode_type(segment: &str) -> ProtocolResult<FrameType> {
    match segment.as_bytes() {
        [digit @ b'0'..=b'9'] => FrameType::from_digit(digit - b'0')
            .ok_or_else(|| ProtocolParseError::Malformed(format!("unknown frame type {}", segment))),
        _ => Err(ProtocolParseError::Malformed(format!(
            "invalid frame type {:?}",
            segment
        ))),
    }
}

/// `+` is only recognized right after a present, nonzero id.
fn decode_id(segment: &str) -> ProtocolResult<(Option<MessageId>, bool)> {
    let (digits, plus) = match segment.strip_suffix('+') {
        Some(digits) => (digits, true),
        None => (segment, false),
    };

    if digits.is_empty() {
        return Ok((None, false));
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolParseError::Malformed(format!(
            "invalid message id {:?}",
            segment
        )));
    }

    let id: MessageId = digits
        .parse()
        .map_err(|_| ProtocolParseError::Malformed(format!("message id out of range: {}", digits)))?;

    if id == 0 {
        Ok((None, false))
    } else {
        Ok((Some(id), plus))
    }
}

fn decode_packet(frame_type: FrameType, data: &str) -> ProtocolResult<Packet> {
    let packet = match frame_type {
        FrameType::Disconnect => Packet::Disconnect,
        FrameType::Connect => Packet::Connect,
        FrameType::Heartbeat => Packet::Heartbeat,
        FrameType::Message => Packet::Message(data.to_string()),
        FrameType::JsonMessage => Packet::JsonMessage(data.to_string()),
        FrameType::Event => decode_event(data)?,
        FrameType::Ack => decode_ack(data)?,
        FrameType::Error => {
            let (reason, advice) = data.split_once('+').unwrap_or((data, ""));
            Packet::Error {
                reason: reason.to_string(),
                advice: advice.to_string(),
            }
        }
        FrameType::Noop => Packet::Noop(data.to_string()),
    };
    Ok(packet)
}

fn decode_event(data: &str) -> ProtocolResult<Packet> {
    let Value::Object(mut object) = serde_json::from_str::<Value>(data)? else {
        return Err(ProtocolParseError::MissingEventName);
    };

    let name = match object.remove("name") {
        Some(Value::String(name)) => name,
        _ => return Err(ProtocolParseError::MissingEventName),
    };

    let args = match object.remove("args") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(args)) => args,
        Some(_) => return Err(ProtocolParseError::InvalidArgs),
    };

    Ok(Packet::Event { name, args })
}

/// Ack data: `id[+][json array]`.
fn decode_ack(data: &str) -> ProtocolResult<Packet> {
    let digits_end = data
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(data.len());
    if digits_end == 0 {
        return Err(malformed("ack without message id"));
    }

    let ack_id: MessageId = data[..digits_end]
        .parse()
        .map_err(|_| malformed("ack id out of range"))?;

    let rest = &data[digits_end..];
    let rest = rest.strip_prefix('+').unwrap_or(rest);
    let args = if rest.is_empty() {
        None
    } else {
        match serde_json::from_str::<Value>(rest)? {
            Value::Array(args) => Some(args),
            _ => return Err(ProtocolParseError::InvalidArgs),
        }
    };

    Ok(Packet::Ack { ack_id, args })
}

fn json_array(values: &[Value]) -> String {
    let items: Vec<String> = values.iter().map(Value::to_string).collect();
    format!("[{}]", items.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_decode_event_with_manual_ack() {
        let frame = decode(r#"5:3+:chat:{"name":"msg","args":["hi"]}"#).expect("decode should succeed");
        assert_eq!(frame.id, Some(3));
        assert!(frame.ack_requested);
        assert_eq!(frame.endpoint, "chat");
        assert_eq!(
            frame.packet,
            Packet::Event {
                name: "msg".into(),
                args: vec![json!("hi")],
            }
        );
        assert_eq!(frame.manual_ack_id(), Some(3));
        assert_eq!(frame.auto_ack_id(), None);
    }

    #[test]
    fn test_encode_event_puts_name_first() {
        let frame = Frame::event("ping", vec![json!(1), json!("x")]).with_id(1, true);
        assert_eq!(encode(&frame), r#"5:1+::{"name":"ping","args":[1,"x"]}"#);
    }

    #[test]
    fn test_decode_ack_with_args() {
        let frame = decode("6:::1+[42]").expect("decode should succeed");
        assert_eq!(frame.id, None);
        assert_eq!(
            frame.packet,
            Packet::Ack {
                ack_id: 1,
                args: Some(vec![json!(42)]),
            }
        );
    }

    #[test]
    fn test_decode_ack_without_args() {
        let frame = decode("6:::12").expect("decode should succeed");
        assert_eq!(frame.packet, Packet::Ack { ack_id: 12, args: None });
    }

    #[test]
    fn test_encode_ack() {
        assert_eq!(encode(&Frame::ack(3, None)), "6:::3");
        assert_eq!(encode(&Frame::ack(3, Some(vec![json!("ok")]))), r#"6:::3+["ok"]"#);
    }

    #[test]
    fn test_decode_error_splits_on_first_plus() {
        let frame = decode("7::chat:not authorized+retry later").expect("decode should succeed");
        assert_eq!(frame.endpoint, "chat");
        assert_eq!(
            frame.packet,
            Packet::Error {
                reason: "not authorized".into(),
                advice: "retry later".into(),
            }
        );

        let frame = decode("7:::a+b+c").expect("decode should succeed");
        assert_eq!(frame.packet, Packet::Error { reason: "a".into(), advice: "b+c".into() });

        let frame = decode("7:::overloaded").expect("decode should succeed");
        assert_eq!(frame.packet, Packet::Error { reason: "overloaded".into(), advice: String::new() });
    }

    #[test]
    fn test_data_may_contain_colons() {
        let frame = decode("3:::a:b:c").expect("decode should succeed");
        assert_eq!(frame.packet, Packet::Message("a:b:c".into()));
    }

    #[test]
    fn test_control_frames() {
        assert_eq!(decode("2::").expect("heartbeat").packet, Packet::Heartbeat);
        let connect = decode("1::/chat").expect("connect");
        assert_eq!(connect.packet, Packet::Connect);
        assert_eq!(connect.endpoint, "/chat");
        assert_eq!(decode("0::/chat").expect("disconnect").packet, Packet::Disconnect);

        assert_eq!(encode(&Frame::heartbeat()), "2::");
        assert_eq!(encode(&Frame::connect("/chat")), "1::/chat");
        assert_eq!(encode(&Frame::disconnect("")), "0::");
    }

    #[test]
    fn test_opaque_payloads_pass_through() {
        let frame = decode(r#"4:::{"a":1}"#).expect("json message");
        assert_eq!(frame.packet, Packet::JsonMessage(r#"{"a":1}"#.into()));
        let frame = decode("8:::whatever").expect("noop");
        assert_eq!(frame.packet, Packet::Noop("whatever".into()));
    }

    #[test]
    fn test_auto_ack_id() {
        let frame = decode("3:7::hello").expect("decode should succeed");
        assert_eq!(frame.auto_ack_id(), Some(7));
        assert_eq!(frame.manual_ack_id(), None);
    }

    #[test]
    fn test_zero_id_means_none() {
        let frame = decode("3:0+::hello").expect("decode should succeed");
        assert_eq!(frame.id, None);
        assert!(!frame.ack_requested);
    }

    #[test]
    fn test_plus_without_id_is_ignored() {
        let frame = decode("3:+::hello").expect("decode should succeed");
        assert_eq!(frame.id, None);
        assert!(!frame.ack_requested);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        for text in ["", "2", "2:", "x::", "9::", "12::", "3:abc::", "3:1x::", "3:99999999999::"] {
            assert_matches!(decode(text), Err(ProtocolParseError::Malformed(_)), "input {:?}", text);
        }
        assert_matches!(decode("6:::"), Err(ProtocolParseError::Malformed(_)));
        assert_matches!(decode("6:::+[1]"), Err(ProtocolParseError::Malformed(_)));
    }

    #[test]
    fn test_decode_event_errors() {
        assert_matches!(decode(r#"5:::{"args":[]}"#), Err(ProtocolParseError::MissingEventName));
        assert_matches!(decode(r#"5:::[1,2]"#), Err(ProtocolParseError::MissingEventName));
        assert_matches!(decode(r#"5:::{"name":7}"#), Err(ProtocolParseError::MissingEventName));
        assert_matches!(
            decode(r#"5:::{"name":"x","args":{"a":1}}"#),
            Err(ProtocolParseError::InvalidArgs)
        );
        assert_matches!(decode("5:::{not json"), Err(ProtocolParseError::JsonDecode(_)));
        assert_matches!(decode("6:::1+{}"), Err(ProtocolParseError::InvalidArgs));
        assert_matches!(decode("6:::1+[oops"), Err(ProtocolParseError::JsonDecode(_)));
    }

    #[test]
    fn test_event_args_default_to_empty() {
        let frame = decode(r#"5:::{"name":"tick"}"#).expect("decode should succeed");
        assert_eq!(frame.packet, Packet::Event { name: "tick".into(), args: vec![] });

        let frame = decode(r#"5:::{"name":"tick","args":null}"#).expect("decode should succeed");
        assert_eq!(frame.packet, Packet::Event { name: "tick".into(), args: vec![] });
    }

    #[test]
    fn test_round_trip_representative_frames() {
        let frames = vec![
            Frame::connect(""),
            Frame::connect("/chat"),
            Frame::heartbeat(),
            Frame::message("hello: world").with_endpoint("/chat").with_id(4, false),
            Frame::new(Packet::JsonMessage(r#"{"a":[1,2]}"#.into())),
            Frame::event("news", vec![json!({"x": 1}), json!(null)]).with_id(9, true),
            Frame::event("bare", vec![]),
            Frame::ack(9, Some(vec![])),
            Frame::ack(10, None),
            Frame::error("unauthorized", ""),
            Frame::new(Packet::Noop(String::new())),
        ];

        for frame in frames {
            let text = encode(&frame);
            assert_eq!(decode(&text).expect("round trip"), frame, "text {:?}", text);
        }
    }
}
