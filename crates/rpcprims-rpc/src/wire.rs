//! Blocking call/reply wire for the client side of a connection.
//!
//! [`CallWriter`] turns call envelopes into `CALL` frames and [`ReplyReader`]
//! turns `REPLY` frames back into [`ReplyFrame`]s. Both run the shared frame
//! codec over their own buffer, so a reply split across many TCP reads is
//! reassembled before it is decoded.

use std::io::{ErrorKind, Read, Write};

use bytes::BytesMut;
use rpcprims_frame::{decode_frame, encode_frame, FrameError, FrameKind, DEFAULT_MAX_PAYLOAD};

use crate::envelope::{decode_reply, CallEnvelope, ReplyFrame};
use crate::error::{Result, RpcError};

const READ_CHUNK: usize = 8 * 1024;

/// Reads reply frames sent by a dispatcher.
pub struct ReplyReader<R> {
    inner: R,
    pending: BytesMut,
    max_payload: usize,
}

impl<R: Read> ReplyReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_payload(inner, DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(inner: R, max_payload: usize) -> Self {
        Self {
            inner,
            pending: BytesMut::with_capacity(READ_CHUNK),
            max_payload,
        }
    }

    /// Block until the next complete reply arrives.
    ///
    /// A `CALL` frame or an undecodable reply is [`RpcError::Protocol`];
    /// EOF, even in the middle of a frame, is [`RpcError::ConnectionClosed`].
    pub fn read_reply(&mut self) -> Result<ReplyFrame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.pending, self.max_payload)? {
                return decode_reply(&frame);
            }
            self.fill()?;
        }
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(RpcError::ConnectionClosed),
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err).into()),
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writes call envelopes, one flushed frame per call.
pub struct CallWriter<W> {
    inner: W,
    scratch: BytesMut,
    max_payload: usize,
}

impl<W: Write> CallWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_max_payload(inner, DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(inner: W, max_payload: usize) -> Self {
        Self {
            inner,
            scratch: BytesMut::new(),
            max_payload,
        }
    }

    /// Encode `call` and write it out. Nothing is written if the envelope is
    /// larger than the payload limit.
    pub fn write_call(&mut self, call: &CallEnvelope) -> Result<()> {
        let payload = serde_json::to_vec(call)?;
        if payload.len() > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            }
            .into());
        }

        self.scratch.clear();
        encode_frame(FrameKind::Call, &payload, &mut self.scratch)?;
        self.inner
            .write_all(&self.scratch)
            .and_then(|()| self.inner.flush())
            .map_err(|err| match err.kind() {
                ErrorKind::WriteZero | ErrorKind::BrokenPipe => RpcError::ConnectionClosed,
                _ => FrameError::Io(err).into(),
            })
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
