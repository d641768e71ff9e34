use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{FrameError, Result};
use crate::finite::check_finite;

/// Frame delimiter: a single line feed (0x0A).
pub const DELIMITER: u8 = b'\n';

/// Reserved key carrying the message kind.
pub const KIND_KEY: &str = "PT";

/// Reserved key carrying the message payload.
pub const DATA_KEY: &str = "DATA";

/// Default maximum size of one frame body: 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default maximum number of bytes requested per read call.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 16 * 1024;

/// A typed application message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Application-defined message kind. Never empty on the wire.
    pub kind: String,
    /// Opaque JSON payload.
    pub payload: Value,
}

impl Message {
    /// Create a new message from an already-built JSON value.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Create a message from any serializable payload.
    ///
    /// Fails with [`FrameError::Encode`] on non-finite floats.
    pub fn from_serialize<T: Serialize + ?Sized>(kind: impl Into<String>, payload: &T) -> Result<Self> {
        check_finite(payload).map_err(FrameError::Encode)?;
        let payload = serde_json::to_value(payload).map_err(FrameError::Encode)?;
        Ok(Self::new(kind, payload))
    }

    /// Deserialize the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.payload).map_err(FrameError::Decode)
    }

    /// Encode this message as one delimited frame.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        encode_message(&self.kind, &self.payload, dst)
    }
}

#[derive(Serialize)]
struct WireMessage<'a, T: ?Sized> {
    #[serde(rename = "PT")]
    kind: &'a str,
    #[serde(rename = "DATA")]
    data: &'a T,
}

/// Encode a message into the wire format.
///
/// Wire format:
/// ```text
/// {"PT":<kind>,"DATA":<payload>}\n
/// ```
///
/// Output is compact `serde_json`, which escapes control characters inside
/// strings and emits no whitespace, so the body never contains the delimiter.
/// NaN and infinite floats anywhere in the payload are rejected with
/// [`FrameError::Encode`] rather than written as `null`.
///
/// On error nothing is appended to `dst`.
pub fn encode_message<T: Serialize + ?Sized>(
    kind: &str,
    payload: &T,
    dst: &mut BytesMut,
) -> Result<()> {
    if kind.is_empty() {
        return Err(FrameError::EmptyKind);
    }
    check_finite(payload).map_err(FrameError::Encode)?;

    let start = dst.len();
    let wire = WireMessage {
        kind,
        data: payload,
    };
    if let Err(err) = serde_json::to_writer((&mut *dst).writer(), &wire) {
        dst.truncate(start);
        return Err(FrameError::Encode(err));
    }
    dst.put_u8(DELIMITER);
    Ok(())
}

/// Encode a message into a freshly allocated frame.
pub fn encode_to_vec<T: Serialize + ?Sized>(kind: &str, payload: &T) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();
    encode_message(kind, payload, &mut buf)?;
    Ok(buf.to_vec())
}

/// Decode one frame body (delimiter already stripped).
///
/// Keys other than `"PT"` and `"DATA"` are ignored. A missing `"DATA"` key
/// decodes as `null`. Trailing whitespace, including the `\r` of a CRLF
/// peer, is accepted.
pub fn decode_message(body: &[u8]) -> Result<Message> {
    let value: Value = serde_json::from_slice(body).map_err(FrameError::Decode)?;
    let Value::Object(mut fields) = value else {
        return Err(FrameError::Decode(serde::de::Error::custom(
            "frame body is not a JSON object",
        )));
    };

    let kind = match fields.remove(KIND_KEY) {
        Some(Value::String(kind)) => kind,
        _ => return Err(FrameError::MissingKind),
    };
    if kind.is_empty() {
        return Err(FrameError::EmptyKind);
    }

    let payload = fields.remove(DATA_KEY).unwrap_or(Value::Null);
    Ok(Message { kind, payload })
}

/// Configuration for frame reading and writing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum bytes buffered without a delimiter. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Maximum bytes requested from the stream per read. Default: 16 KiB.
    pub read_chunk_size: usize,
    /// Read timeout for blocking operations. Default: none.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations. Default: none.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serializer};
    use serde_json::json;

    use super::*;

    fn body_of(frame: &[u8]) -> &[u8] {
        assert_eq!(frame.last(), Some(&DELIMITER));
        &frame[..frame.len() - 1]
    }

    #[test]
    fn test_encode_exact_bytes() {
        let frame = encode_to_vec("chat", &json!({"msg": "hi"})).unwrap();
        assert_eq!(frame, b"{\"PT\":\"chat\",\"DATA\":{\"msg\":\"hi\"}}\n");
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let payloads = [
            json!(null),
            json!(true),
            json!(-17),
            json!(1.5),
            json!("plain"),
            json!([1, "two", {"three": 3}]),
            json!({"nested": {"deep": [null, false, "x"]}, "n": 18446744073709551615u64}),
        ];

        for payload in payloads {
            let frame = encode_to_vec("kind", &payload).unwrap();
            let message = decode_message(body_of(&frame)).unwrap();
            assert_eq!(message, Message::new("kind", payload));
        }
    }

    #[test]
    fn test_delimiter_never_in_body() {
        let payload = json!({
            "text": "line one\nline two\r\n\ttabbed",
            "key\nwith newline": ["\n", "\u{2028}", "\u{0}"],
        });
        let frame = encode_to_vec("multi\nline kind", &payload).unwrap();

        let body = body_of(&frame);
        assert!(!body.contains(&DELIMITER));
        assert_eq!(frame.iter().filter(|b| **b == DELIMITER).count(), 1);

        let message = decode_message(body).unwrap();
        assert_eq!(message.kind, "multi\nline kind");
        assert_eq!(message.payload, payload);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let mut map = BTreeMap::new();
        map.insert("b", 2);
        map.insert("a", 1);

        let first = encode_to_vec("k", &map).unwrap();
        let second = encode_to_vec("k", &map).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, b"{\"PT\":\"k\",\"DATA\":{\"a\":1,\"b\":2}}\n");
    }

    #[test]
    fn test_encode_appends_to_existing_buffer() {
        let mut buf = BytesMut::new();
        encode_message("a", &1, &mut buf).unwrap();
        encode_message("b", &2, &mut buf).unwrap();
        assert_eq!(&buf[..], b"{\"PT\":\"a\",\"DATA\":1}\n{\"PT\":\"b\",\"DATA\":2}\n");
    }

    struct Unrepresentable;

    impl Serialize for Unrepresentable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("value cannot be encoded"))
        }
    }

    #[test]
    fn test_encode_error_leaves_buffer_untouched() {
        let mut buf = BytesMut::from(&b"prefix"[..]);
        let err = encode_message("k", &vec![Unrepresentable], &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::Encode(_)));
        assert_eq!(&buf[..], b"prefix");
    }

    #[test]
    fn test_encode_rejects_non_string_map_keys() {
        let mut map = BTreeMap::new();
        map.insert(vec![1u8, 2], "v");
        let err = encode_to_vec("k", &map).unwrap_err();
        assert!(matches!(err, FrameError::Encode(_)));
    }

    #[test]
    fn test_encode_rejects_non_finite_floats() {
        #[derive(Serialize)]
        struct Position {
            x: f64,
            y: f64,
        }

        #[derive(Serialize)]
        struct Player {
            name: &'static str,
            position: Position,
        }

        let player = Player {
            name: "p1",
            position: Position { x: 1.0, y: f64::INFINITY },
        };
        fn assert_rejected<T: Serialize + ?Sized>(payload: &T) {
            let mut buf = BytesMut::from(&b"prefix"[..]);
            let err = encode_message("k", payload, &mut buf).unwrap_err();
            assert!(matches!(err, FrameError::Encode(_)), "{err:?}");
            assert_eq!(&buf[..], b"prefix");
        }

        assert_rejected(&f64::NAN);
        assert_rejected(&f64::INFINITY);
        assert_rejected(&vec![1.0, f64::NEG_INFINITY]);
        assert_rejected(&player);

        assert!(matches!(
            Message::from_serialize("k", &player),
            Err(FrameError::Encode(_))
        ));
        assert!(matches!(
            Message::from_serialize("k", &f32::NAN),
            Err(FrameError::Encode(_))
        ));
        encode_to_vec("k", &Position { x: f64::MAX, y: -0.0 }).unwrap();
    }

    #[test]
    fn test_encode_rejects_empty_kind() {
        let err = encode_to_vec("", &json!({})).unwrap_err();
        assert!(matches!(err, FrameError::EmptyKind));
    }

    #[test]
    fn test_decode_malformed_json() {
        let err = decode_message(b"{\"PT\":\"chat\",").unwrap_err();
        assert!(matches!(err, FrameError::Decode(_)));
        assert!(err.is_frame_local());
    }

    #[test]
    fn test_decode_non_object() {
        let err = decode_message(b"[\"PT\",\"chat\"]").unwrap_err();
        assert!(matches!(err, FrameError::Decode(_)));
    }

    #[test]
    fn test_decode_missing_kind() {
        let err = decode_message(b"{\"DATA\":{\"msg\":\"hi\"}}").unwrap_err();
        assert!(matches!(err, FrameError::MissingKind));

        let err = decode_message(b"{\"PT\":7,\"DATA\":null}").unwrap_err();
        assert!(matches!(err, FrameError::MissingKind));
    }

    #[test]
    fn test_decode_empty_kind() {
        let err = decode_message(b"{\"PT\":\"\",\"DATA\":1}").unwrap_err();
        assert!(matches!(err, FrameError::EmptyKind));
    }

    #[test]
    fn test_decode_missing_data_is_null() {
        let message = decode_message(b"{\"PT\":\"ping\"}").unwrap();
        assert_eq!(message, Message::new("ping", Value::Null));
    }

    #[test]
    fn test_decode_tolerates_crlf_and_extra_keys() {
        let message = decode_message(b"{\"PT\":\"chat\",\"DATA\":1,\"extra\":true}\r").unwrap();
        assert_eq!(message, Message::new("chat", json!(1)));
    }

    #[test]
    fn test_payload_as_typed() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Move {
            x: i32,
            y: i32,
        }

        let message = Message::from_serialize("move", &Move { x: 3, y: -4 }).unwrap();
        let mut buf = BytesMut::new();
        message.encode(&mut buf).unwrap();

        let decoded = decode_message(body_of(&buf)).unwrap();
        assert_eq!(decoded.payload_as::<Move>().unwrap(), Move { x: 3, y: -4 });
        assert!(matches!(
            decoded.payload_as::<Vec<String>>(),
            Err(FrameError::Decode(_))
        ));
    }
}
