//! Length-prefixed call/reply framing for rpcprims.
//!
//! Every message on an upgraded RPC stream is framed with:
//! - A 2-byte magic number ("RP") for stream synchronization
//! - A 4-byte little-endian payload length
//! - A 2-byte little-endian frame kind (call or reply)
//!
//! [`encode_frame`] and [`decode_frame`] work on caller-owned buffers and
//! validate the header before any payload arrives. The `async` feature adds
//! a `tokio_util` codec over the same functions.

pub mod codec;
pub mod error;
pub mod kind;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::FrameCodec;
pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use kind::FrameKind;
