use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use bytes::Bytes;
use linecast_transport::NetStream;

use crate::codec::{decode_message, FrameConfig, Message};
use crate::error::{FrameError, Result};
use crate::reassembler::Reassembler;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// Each reader owns its own [`Reassembler`], so one reader per connection.
pub struct FrameReader<T> {
    inner: T,
    reassembler: Reassembler,
    ready: VecDeque<Bytes>,
    chunk: Vec<u8>,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            reassembler: Reassembler::new(),
            ready: VecDeque::new(),
            chunk: vec![0u8; config.read_chunk_size.max(1)],
            config,
        }
    }

    /// Read the next complete frame body (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached. Bytes
    /// of an unfinished frame at EOF are discarded.
    pub fn read_frame(&mut self) -> Result<Bytes> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(frame);
            }

            let pending = self.reassembler.pending_len();
            if pending > self.config.max_frame_size {
                self.reassembler.clear();
                return Err(FrameError::FrameTooLarge {
                    size: pending,
                    max: self.config.max_frame_size,
                });
            }

            let read = match self.inner.read(&mut self.chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if !self.reassembler.is_empty() {
                    tracing::debug!(
                        bytes = self.reassembler.pending_len(),
                        "connection closed mid-frame"
                    );
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.ready.extend(self.reassembler.feed(&self.chunk[..read]));
        }
    }

    /// Read and decode the next message (blocking).
    ///
    /// A body that fails to decode is consumed and reported; see
    /// [`FrameError::is_frame_local`]. The next call continues with the
    /// following frame.
    pub fn read_message(&mut self) -> Result<Message> {
        let body = self.read_frame()?;
        decode_message(&body)
    }

    /// Read the next message that decodes, skipping corrupt frames.
    pub fn next_valid_message(&mut self) -> Result<Message> {
        loop {
            match self.read_message() {
                Ok(message) => return Ok(message),
                Err(err) if err.is_frame_local() => {
                    tracing::warn!(error = %err, "dropping undecodable frame");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Bytes buffered toward a frame that has not been completed yet.
    pub fn pending(&self) -> &[u8] {
        self.reassembler.pending()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum frame size for subsequent reads.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<NetStream> {
    /// Create a frame reader for `NetStream` and apply read timeout from config.
    pub fn with_config_net(inner: NetStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: linecast_transport::TransportError) -> FrameError {
    match err {
        linecast_transport::TransportError::Io(io)
        | linecast_transport::TransportError::Accept(io) => FrameError::Io(io),
        linecast_transport::TransportError::Bind { source, .. }
        | linecast_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
