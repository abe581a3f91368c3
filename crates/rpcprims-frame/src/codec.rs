use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::FrameKind;

/// Frame header: magic (2) + length (4) + kind (2) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic bytes: "RP" (0x52 0x50).
pub const MAGIC: [u8; 2] = [0x52, 0x50];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// One call or reply as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// JSON-encoded envelope.
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn call(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Call, payload)
    }

    pub fn reply(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Reply, payload)
    }

    /// Bytes this frame occupies once encoded.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Parsed fixed-size prefix of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameHeader {
    kind: FrameKind,
    payload_len: usize,
}

impl FrameHeader {
    /// Parse the first [`HEADER_SIZE`] bytes of `src`; the caller guarantees
    /// they are present.
    fn parse(src: &[u8], max_payload: usize) -> Result<Self> {
        if src[0..2] != MAGIC {
            return Err(FrameError::InvalidMagic);
        }
        let payload_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
        if payload_len > max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: payload_len,
                max: max_payload,
            });
        }
        let kind = FrameKind::try_from(u16::from_le_bytes([src[6], src[7]]))?;
        Ok(Self { kind, payload_len })
    }

    fn write(self, dst: &mut BytesMut) {
        dst.put_slice(&MAGIC);
        dst.put_u32_le(self.payload_len as u32);
        dst.put_u16_le(self.kind.into());
    }
}

/// Append one frame to `dst`.
///
/// ```text
/// ┌──────────────┬───────────┬──────────┬─────────────────┐
/// │ Magic (2B)   │ Length    │ Kind     │ Payload          │
/// │ 0x52 0x50    │ (4B LE)  │ (2B LE)  │ (Length bytes)   │
/// │ "RP"         │          │          │                  │
/// └──────────────┴───────────┴──────────┴─────────────────┘
/// ```
pub fn encode_frame(kind: FrameKind, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    FrameHeader {
        kind,
        payload_len: payload.len(),
    }
    .write(dst);
    dst.put_slice(payload);
    Ok(())
}

/// Take one complete frame off the front of `src`.
///
/// `Ok(None)` means more bytes are needed; nothing is consumed in that case.
/// The header is validated as soon as it is available, so a bad magic,
/// unknown kind or oversized length fails before the payload arrives.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }
    let header = FrameHeader::parse(&src[..HEADER_SIZE], max_payload)?;

    let total = HEADER_SIZE + header.payload_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(header.payload_len).freeze();
    Ok(Some(Frame {
        kind: header.kind,
        payload,
    }))
}

/// Payload limit and socket timeouts for a blocking client connection.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest payload accepted or sent. Default: 16 MiB.
    pub max_payload_size: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
