//! Newline-delimited JSON message framing for linecast.
//!
//! Every message travels as one compact JSON object followed by a single
//! `\n` byte:
//!
//! ```text
//! {"PT":"chat","DATA":{"msg":"hi"}}\n
//! ```
//!
//! `"PT"` carries the message kind and `"DATA"` the opaque payload. The
//! [`Reassembler`] turns arbitrarily chunked socket reads back into frame
//! bodies; [`FrameReader`] and [`FrameWriter`] wrap any blocking stream.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
mod finite;
pub mod reader;
pub mod reassembler;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::MessageCodec;
pub use codec::{
    decode_message, encode_message, encode_to_vec, FrameConfig, Message, DATA_KEY,
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_READ_CHUNK_SIZE, DELIMITER, KIND_KEY,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use reassembler::Reassembler;
pub use writer::{write_all, FrameWriter};
