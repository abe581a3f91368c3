use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::SinkExt;
use rpcprims_frame::{FrameCodec, FrameError};
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWrite;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::envelope::{encode_reply, ReplyFrame};
use crate::error::{Result, RpcError};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The write half of a connection, shared by every call running on it.
///
/// Holding the lock is the only way to put a frame on the wire, so frames of
/// concurrent calls never interleave.
#[derive(Clone)]
pub(crate) struct ReplySink {
    writer: Arc<Mutex<FramedWrite<BoxedWriter, FrameCodec>>>,
    broken: CancellationToken,
}

impl ReplySink {
    /// `broken` is cancelled when a write fails, and writes stop once it is.
    pub(crate) fn new<W>(writer: W, codec: FrameCodec, broken: CancellationToken) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: BoxedWriter = Box::new(writer);
        Self {
            writer: Arc::new(Mutex::new(FramedWrite::new(writer, codec))),
            broken,
        }
    }

    pub(crate) async fn lock(&self) -> SinkGuard<'_> {
        SinkGuard {
            writer: self.writer.lock().await,
            broken: &self.broken,
        }
    }
}

pub(crate) struct SinkGuard<'a> {
    writer: MutexGuard<'a, FramedWrite<BoxedWriter, FrameCodec>>,
    broken: &'a CancellationToken,
}

impl SinkGuard<'_> {
    /// Encode, write and flush one reply.
    pub(crate) async fn send(&mut self, reply: &ReplyFrame) -> Result<()> {
        if self.broken.is_cancelled() {
            return Err(RpcError::ConnectionClosed);
        }
        let frame = encode_reply(reply)?;
        match self.writer.send(frame).await {
            Ok(()) => {
                trace!(
                    seq = reply.seq,
                    index = reply.index,
                    is_final = reply.is_final,
                    "reply written"
                );
                Ok(())
            }
            // Rejected before any byte was written; the stream is still usable.
            Err(err @ FrameError::PayloadTooLarge { .. }) => Err(err.into()),
            Err(err) => {
                self.broken.cancel();
                Err(err.into())
            }
        }
    }
}

struct CallState {
    next_index: AtomicU64,
    closed: AtomicBool,
}

/// Untyped reply path of one streaming call.
///
/// `CallState` is only read or written while the sink lock is held, which
/// keeps index assignment, the closed check and the write itself atomic.
#[derive(Clone)]
pub(crate) struct ReplyChannel {
    seq: u64,
    sink: ReplySink,
    state: Arc<CallState>,
}

impl ReplyChannel {
    /// Open the reply path of a streaming call. The guard writes the
    /// terminal frame and closes every emitter built on the channel.
    pub(crate) fn open(seq: u64, sink: ReplySink) -> (ReplyChannel, CallGuard) {
        let state = Arc::new(CallState {
            next_index: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        let channel = ReplyChannel {
            seq,
            sink: sink.clone(),
            state: Arc::clone(&state),
        };
        (channel, CallGuard { seq, sink, state })
    }

    async fn send_data(&self, payload: Value) -> Result<()> {
        let mut sink = self.sink.lock().await;
        if self.state.closed.load(Ordering::Acquire) {
            return Err(RpcError::EmitterClosed);
        }
        let index = self.state.next_index.load(Ordering::Acquire);
        sink.send(&ReplyFrame::data(self.seq, index, payload)).await?;
        self.state.next_index.store(index + 1, Ordering::Release);
        Ok(())
    }

    fn emitted(&self) -> u64 {
        self.state.next_index.load(Ordering::Acquire)
    }
}

/// Dispatcher-side end of a streaming call.
pub(crate) struct CallGuard {
    seq: u64,
    sink: ReplySink,
    state: Arc<CallState>,
}

impl CallGuard {
    /// Close the call and write its terminal frame. The terminal index is the
    /// number of data frames written before it.
    pub(crate) async fn finish(self, error: Option<String>) -> Result<()> {
        let mut sink = self.sink.lock().await;
        self.state.closed.store(true, Ordering::Release);
        let index = self.state.next_index.load(Ordering::Acquire);
        let reply = match error {
            Some(message) => ReplyFrame::failure(self.seq, index, message),
            None => ReplyFrame::success(self.seq, index),
        };
        sink.send(&reply).await
    }
}

/// Handle a streaming handler uses to push replies for its call.
///
/// The emitter is handed to the handler by value and is only live while the
/// handler runs: once it returns, every further `emit` fails with
/// [`RpcError::EmitterClosed`] and writes nothing. Each successful `emit`
/// has been written and flushed before it returns.
pub struct ReplyEmitter<R> {
    channel: ReplyChannel,
    _reply: PhantomData<fn(&R)>,
}

impl<R: Serialize> ReplyEmitter<R> {
    pub(crate) fn new(channel: ReplyChannel) -> Self {
        Self {
            channel,
            _reply: PhantomData,
        }
    }

    /// Send one reply value in the next index slot.
    pub async fn emit(&mut self, reply: &R) -> Result<()>
    where
        R: Sync,
    {
        self.emit_value(reply).await
    }

    /// Send any serializable value in the next index slot.
    ///
    /// The value is not checked against the method's reply type; a caller
    /// expecting `R` sees a type mismatch for this index.
    pub async fn emit_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let payload = serde_json::to_value(value)?;
        self.channel.send_data(payload).await
    }

    /// Sequence id of the call this emitter belongs to.
    pub fn seq(&self) -> u64 {
        self.channel.seq
    }

    /// Number of data frames written for the call so far.
    pub fn emitted(&self) -> u64 {
        self.channel.emitted()
    }
}

impl<R> fmt::Debug for ReplyEmitter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyEmitter")
            .field("seq", &self.channel.seq)
            .field("emitted", &self.channel.emitted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use rpcprims_frame::Frame;
    use serde_json::json;
    use tokio::io::DuplexStream;
    use tokio_util::codec::FramedRead;

    use super::*;
    use crate::envelope::decode_reply;

    fn sink_pair() -> (ReplySink, FramedRead<DuplexStream, FrameCodec>, CancellationToken) {
        let (server, client) = tokio::io::duplex(4096);
        let broken = CancellationToken::new();
        let sink = ReplySink::new(server, FrameCodec::new(), broken.clone());
        (sink, FramedRead::new(client, FrameCodec::new()), broken)
    }

    async fn next_reply(frames: &mut FramedRead<DuplexStream, FrameCodec>) -> ReplyFrame {
        let frame: Frame = frames.next().await.unwrap().unwrap();
        decode_reply(&frame).unwrap()
    }

    #[tokio::test]
    async fn indices_start_at_zero_and_terminal_counts_frames() {
        let (sink, mut frames, _) = sink_pair();
        let (channel, guard) = ReplyChannel::open(7, sink);
        let mut emitter = ReplyEmitter::<u32>::new(channel);

        emitter.emit(&10).await.unwrap();
        emitter.emit(&11).await.unwrap();
        assert_eq!(emitter.emitted(), 2);
        guard.finish(None).await.unwrap();

        assert_eq!(next_reply(&mut frames).await, ReplyFrame::data(7, 0, json!(10)));
        assert_eq!(next_reply(&mut frames).await, ReplyFrame::data(7, 1, json!(11)));
        assert_eq!(next_reply(&mut frames).await, ReplyFrame::success(7, 2));
    }

    #[tokio::test]
    async fn emit_value_skips_type_check_and_takes_a_slot() {
        let (sink, mut frames, _) = sink_pair();
        let (channel, guard) = ReplyChannel::open(1, sink);
        let mut emitter = ReplyEmitter::<u32>::new(channel);

        emitter.emit_value(&json!({"not": "a number"})).await.unwrap();
        emitter.emit(&5).await.unwrap();
        guard.finish(Some("stopped".into())).await.unwrap();

        let bad = next_reply(&mut frames).await;
        assert_eq!((bad.index, bad.payload), (0, Some(json!({"not": "a number"}))));
        assert_eq!(next_reply(&mut frames).await.index, 1);
        assert_eq!(
            next_reply(&mut frames).await,
            ReplyFrame::failure(1, 2, "stopped")
        );
    }

    #[tokio::test]
    async fn emit_after_finish_is_rejected() {
        let (sink, mut frames, _) = sink_pair();
        let (channel, guard) = ReplyChannel::open(3, sink);
        let mut leaked = ReplyEmitter::<u32>::new(channel);

        guard.finish(None).await.unwrap();
        let err = leaked.emit(&1).await.unwrap_err();
        assert!(matches!(err, RpcError::EmitterClosed));

        assert_eq!(next_reply(&mut frames).await, ReplyFrame::success(3, 0));
        drop(leaked);
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn broken_sink_refuses_writes() {
        let (sink, frames, broken) = sink_pair();
        drop(frames);
        let (channel, _guard) = ReplyChannel::open(9, sink.clone());
        let mut emitter = ReplyEmitter::<u32>::new(channel);

        let err = emitter.emit(&1).await.unwrap_err();
        assert!(matches!(err, RpcError::Frame(FrameError::Io(_))));
        assert!(broken.is_cancelled());

        let err = emitter.emit(&2).await.unwrap_err();
        assert!(matches!(err, RpcError::ConnectionClosed));
        assert_eq!(emitter.emitted(), 0);
    }

    #[tokio::test]
    async fn oversized_reply_leaves_stream_usable() {
        let (server, client) = tokio::io::duplex(4096);
        let broken = CancellationToken::new();
        let sink = ReplySink::new(server, FrameCodec::with_max_payload(64), broken.clone());
        let mut frames = FramedRead::new(client, FrameCodec::new());
        let (channel, guard) = ReplyChannel::open(2, sink);
        let mut emitter = ReplyEmitter::<String>::new(channel);

        let err = emitter.emit(&"x".repeat(200)).await.unwrap_err();
        assert!(matches!(err, RpcError::Frame(FrameError::PayloadTooLarge { .. })));
        assert!(!broken.is_cancelled());

        guard.finish(None).await.unwrap();
        assert_eq!(next_reply(&mut frames).await, ReplyFrame::success(2, 0));
    }
}
