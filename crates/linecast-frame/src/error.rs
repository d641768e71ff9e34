/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload cannot be represented as JSON.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// A frame body is not a well-formed JSON object.
    #[error("malformed frame: {0}")]
    Decode(#[source] serde_json::Error),

    /// A frame body has no string `"PT"` field.
    #[error("frame has no message kind (\"PT\" field)")]
    MissingKind,

    /// A message kind is the empty string.
    #[error("message kind must not be empty")]
    EmptyKind,

    /// Bytes without a delimiter exceed the configured maximum frame size.
    #[error("frame too large ({size} bytes buffered without delimiter, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether the error is confined to a single frame.
    ///
    /// The offending body has already been consumed, so the stream remains
    /// usable and the next read continues with the following frame.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            FrameError::Decode(_) | FrameError::MissingKind | FrameError::EmptyKind
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
