//! `tokio_util::codec` adapter for the line-delimited message format.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_message, encode_message, Message, DEFAULT_MAX_FRAME_SIZE, DELIMITER};
use crate::error::FrameError;

/// Tokio codec producing [`Message`]s from a byte stream.
///
/// Same wire format as [`crate::FrameReader`]/[`crate::FrameWriter`]. Bodies
/// that fail to decode are logged and skipped so one corrupt frame does not
/// end the stream.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_frame_size: usize,
    // Prefix of the decode buffer already known to contain no delimiter.
    scanned: usize,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            scanned: 0,
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, FrameError> {
        loop {
            let Some(offset) = src[self.scanned..].iter().position(|b| *b == DELIMITER) else {
                self.scanned = src.len();
                if src.len() > self.max_frame_size {
                    return Err(FrameError::FrameTooLarge {
                        size: src.len(),
                        max: self.max_frame_size,
                    });
                }
                return Ok(None);
            };

            let body = src.split_to(self.scanned + offset);
            src.advance(1);
            self.scanned = 0;

            match decode_message(&body) {
                Ok(message) => return Ok(Some(message)),
                Err(err) if err.is_frame_local() => {
                    tracing::warn!(error = %err, "dropping undecodable frame");
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_message(&item.kind, &item.payload, dst)
    }
}

impl Encoder<&Message> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_message(&item.kind, &item.payload, dst)
    }
}
