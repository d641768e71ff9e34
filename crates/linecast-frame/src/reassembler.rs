use bytes::{Buf, Bytes, BytesMut};

use crate::codec::DELIMITER;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Splits an arbitrarily chunked byte stream back into frame bodies.
///
/// Owns the reassembly buffer for exactly one connection. Bytes that do not
/// yet end in a delimiter are kept until a later [`Reassembler::feed`]
/// completes them; complete frames are always extracted eagerly, so the
/// buffer never holds one between calls.
#[derive(Debug)]
pub struct Reassembler {
    buf: BytesMut,
    // Prefix of `buf` already known to contain no delimiter.
    scanned: usize,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            scanned: 0,
        }
    }

    /// Append `chunk` and return every frame body it completes, in order.
    ///
    /// Bodies exclude the delimiter. An empty chunk produces nothing; callers
    /// reading from a socket treat a zero-length read as the peer closing.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    fn next_frame(&mut self) -> Option<Bytes> {
        match self.buf[self.scanned..].iter().position(|b| *b == DELIMITER) {
            Some(offset) => {
                let end = self.scanned + offset;
                let body = self.buf.split_to(end).freeze();
                self.buf.advance(1);
                self.scanned = 0;
                Some(body)
            }
            None => {
                self.scanned = self.buf.len();
                None
            }
        }
    }

    /// Bytes received but not yet forming a complete frame.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discard any partial frame.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.scanned = 0;
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}
