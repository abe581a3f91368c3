use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::codec::{decode_frame, encode_frame, Frame, DEFAULT_MAX_PAYLOAD};
use crate::error::FrameError;

/// `tokio_util` codec over [`crate::encode_frame`] and [`crate::decode_frame`].
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload_size: usize,
}

impl FrameCodec {
    /// Codec with the default 16 MiB payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Codec with an explicit payload limit (applies both directions).
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    /// Current payload limit.
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        let frame = decode_frame(src, self.max_payload_size)?;
        if let Some(frame) = &frame {
            trace!(kind = %frame.kind, size = frame.payload.len(), "decoded frame");
        }
        Ok(frame)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        if item.payload.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: item.payload.len(),
                max: self.max_payload_size,
            });
        }
        encode_frame(item.kind, &item.payload, dst)
    }
}
