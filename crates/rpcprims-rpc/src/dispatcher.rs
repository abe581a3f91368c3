use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{FutureExt, StreamExt};
use rpcprims_frame::{FrameCodec, FrameError, DEFAULT_MAX_PAYLOAD};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::emitter::{ReplyChannel, ReplySink};
use crate::envelope::{decode_call, CallEnvelope, ReplyFrame};
use crate::error::{Result, RpcError};
use crate::registry::{MethodDescriptor, MethodHandler, Registry};

/// Terminal error text of a call whose handler panicked.
pub const HANDLER_PANICKED: &str = "handler panicked";

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Largest call or reply payload accepted on a connection.
    pub max_payload_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Serves calls from a [`Registry`] over duplex byte streams.
///
/// Cheap to clone; every clone shares the same registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, DispatcherConfig::default())
    }

    pub fn with_config(registry: Registry, config: DispatcherConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Serve one connection until it ends.
    ///
    /// Every call runs in its own task; replies of different calls share the
    /// write half one frame at a time. Returns:
    /// - `Ok(())` once the peer has closed its side and every pending call has
    ///   replied, or when `cancel` fires (in-flight calls are aborted).
    /// - `Err` on a malformed frame or envelope, or when a reply write fails.
    pub async fn serve<S>(&self, stream: S, cancel: CancellationToken) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let codec = FrameCodec::with_max_payload(self.config.max_payload_size);
        let (read_half, write_half) = tokio::io::split(stream);
        let mut frames = FramedRead::new(read_half, codec.clone());
        let conn = cancel.child_token();
        let sink = ReplySink::new(write_half, codec, conn.clone());
        let mut calls = JoinSet::new();
        let mut reading = true;

        let outcome = loop {
            if !reading && calls.is_empty() {
                break Ok(());
            }
            tokio::select! {
                _ = conn.cancelled() => {
                    break if cancel.is_cancelled() {
                        Ok(())
                    } else {
                        Err(RpcError::ConnectionClosed)
                    };
                }
                Some(joined) = calls.join_next() => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            warn!(error = %err, "call task panicked");
                        }
                    }
                }
                frame = frames.next(), if reading => match frame {
                    Some(Ok(frame)) => match decode_call(&frame) {
                        Ok(call) => self.start_call(&mut calls, &sink, call),
                        Err(err) => break Err(err),
                    },
                    Some(Err(FrameError::ConnectionClosed)) => break Err(RpcError::ConnectionClosed),
                    Some(Err(err)) => break Err(err.into()),
                    None => {
                        debug!(pending = calls.len(), "peer finished sending calls");
                        reading = false;
                    }
                },
            }
        };

        conn.cancel();
        let aborted = calls.len();
        calls.shutdown().await;
        match &outcome {
            Ok(()) => debug!(aborted, "connection finished"),
            Err(err) => warn!(error = %err, aborted, "connection failed"),
        }
        outcome
    }

    fn start_call(&self, calls: &mut JoinSet<()>, sink: &ReplySink, call: CallEnvelope) {
        let CallEnvelope { method, seq, args } = call;
        let sink = sink.clone();
        match self.registry.resolve(&method) {
            Ok(descriptor) => {
                calls.spawn(run_call(descriptor, seq, args, sink));
            }
            Err(err) => {
                debug!(method = %method, seq, "unknown method");
                calls.spawn(async move {
                    let reply = ReplyFrame::failure(seq, 0, err.to_string());
                    if let Err(err) = sink.lock().await.send(&reply).await {
                        debug!(seq, error = %err, "reply not delivered");
                    }
                });
            }
        }
    }
}

async fn run_call(descriptor: Arc<MethodDescriptor>, seq: u64, args: Value, sink: ReplySink) {
    let started = Instant::now();
    debug!(method = descriptor.name(), seq, "call started");

    let delivered = match &descriptor.handler {
        MethodHandler::Unary(handler) => {
            let outcome = AssertUnwindSafe(async { handler(args).await })
                .catch_unwind()
                .await;
            let reply = match outcome {
                Ok(Ok(value)) => ReplyFrame::unary(seq, value),
                Ok(Err(err)) => ReplyFrame::failure(seq, 0, err.to_string()),
                Err(_) => {
                    warn!(method = descriptor.name(), seq, "handler panicked");
                    ReplyFrame::failure(seq, 0, HANDLER_PANICKED)
                }
            };
            let mut sink = sink.lock().await;
            match sink.send(&reply).await {
                Err(RpcError::Frame(err @ FrameError::PayloadTooLarge { .. })) => {
                    sink.send(&ReplyFrame::failure(seq, 0, err.to_string()))
                        .await
                }
                other => other,
            }
        }
        MethodHandler::Streaming(handler) => {
            let (channel, guard) = ReplyChannel::open(seq, sink);
            let outcome = AssertUnwindSafe(async { handler(args, channel).await })
                .catch_unwind()
                .await;
            let error = match outcome {
                Ok(result) => result.err().map(|err| err.to_string()),
                Err(_) => {
                    warn!(method = descriptor.name(), seq, "handler panicked");
                    Some(HANDLER_PANICKED.to_string())
                }
            };
            guard.finish(error).await
        }
    };

    match delivered {
        Ok(()) => debug!(
            method = descriptor.name(),
            seq,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "call finished"
        ),
        Err(err) => debug!(
            method = descriptor.name(),
            seq,
            error = %err,
            "reply not delivered"
        ),
    }
}
