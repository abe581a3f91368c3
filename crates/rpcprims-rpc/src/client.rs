use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{Read, Write};
use std::marker::PhantomData;

use rpcprims_frame::FrameConfig;
use rpcprims_transport::{connect_with_config, ConnectConfig, RpcStream};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::envelope::{CallEnvelope, ReplyFrame};
use crate::error::{Result, RpcError};
use crate::wire::{CallWriter, ReplyReader};

/// Client configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub connect: ConnectConfig,
    pub frame: FrameConfig,
}

/// Blocking RPC client.
///
/// Calls can be pipelined: [`Client::send_call`] returns the sequence id and
/// replies are collected per id, so frames of other calls read in between
/// are kept until asked for. Frames of a call nobody will read any more
/// (see [`ReplyStream`] and [`Client::wait_unary`]) are dropped on arrival.
pub struct Client<R = RpcStream, W = RpcStream> {
    reader: ReplyReader<R>,
    writer: CallWriter<W>,
    next_seq: u64,
    parked: HashMap<u64, VecDeque<ReplyFrame>>,
    abandoned: HashSet<u64>,
}

impl Client {
    /// Connect to `addr` (`host:port`) with default settings.
    pub fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_config(addr, &ClientConfig::default())
    }

    pub fn connect_with_config(addr: &str, config: &ClientConfig) -> Result<Self> {
        let stream = connect_with_config(addr, &config.connect)?;
        stream.set_read_timeout(config.frame.read_timeout)?;
        stream.set_write_timeout(config.frame.write_timeout)?;
        let read_half = stream.try_clone()?;
        let max = config.frame.max_payload_size;
        Ok(Self::from_parts(
            ReplyReader::with_max_payload(read_half, max),
            CallWriter::with_max_payload(stream, max),
        ))
    }

    /// Shut the connection down in both directions.
    pub fn close(self) -> Result<()> {
        self.writer.into_inner().close()?;
        Ok(())
    }
}

impl<R, W> Client<R, W> {
    /// Stop collecting replies for `seq`. Frames already parked are dropped
    /// and later ones are discarded until the call's terminal frame.
    fn abandon(&mut self, seq: u64) {
        let finished = self
            .parked
            .remove(&seq)
            .is_some_and(|queue| queue.iter().any(|reply| reply.is_final));
        if !finished {
            self.abandoned.insert(seq);
        }
    }
}

impl<R: Read, W: Write> Client<R, W> {
    /// Build a client over an already upgraded stream pair.
    pub fn from_parts(reader: ReplyReader<R>, writer: CallWriter<W>) -> Self {
        Self {
            reader,
            writer,
            next_seq: 1,
            parked: HashMap::new(),
            abandoned: HashSet::new(),
        }
    }

    /// Send a call without waiting for its replies.
    pub fn send_call<A: Serialize + ?Sized>(&mut self, method: &str, args: &A) -> Result<u64> {
        let seq = self.next_seq;
        let call = CallEnvelope::new(method, seq, serde_json::to_value(args)?);
        self.writer.write_call(&call)?;
        self.next_seq += 1;
        debug!(method, seq, "call sent");
        Ok(seq)
    }

    /// Next reply frame of call `seq`, in arrival order.
    pub fn next_reply(&mut self, seq: u64) -> Result<ReplyFrame> {
        if let Some(queue) = self.parked.get_mut(&seq) {
            if let Some(reply) = queue.pop_front() {
                if queue.is_empty() {
                    self.parked.remove(&seq);
                }
                return Ok(reply);
            }
        }

        loop {
            let reply = self.reader.read_reply()?;
            if reply.seq == seq {
                return Ok(reply);
            }
            if self.abandoned.contains(&reply.seq) {
                if reply.is_final {
                    self.abandoned.remove(&reply.seq);
                }
                continue;
            }
            self.parked.entry(reply.seq).or_default().push_back(reply);
        }
    }

    /// Wait for the single reply of a unary call sent with [`Client::send_call`].
    pub fn wait_unary<T: DeserializeOwned>(&mut self, seq: u64) -> Result<T> {
        let reply = self.next_reply(seq)?;
        if let Some(message) = reply.error {
            return Err(RpcError::Remote {
                message,
                delivered: 0,
            });
        }
        if !reply.is_final {
            self.abandon(seq);
            return Err(RpcError::Protocol(format!(
                "call {seq} streamed a reply where one final reply was expected"
            )));
        }
        let payload = reply.payload.unwrap_or(Value::Null);
        serde_json::from_value(payload).map_err(|source| RpcError::TypeMismatch {
            index: reply.index,
            source,
        })
    }

    /// Call a unary method and wait for its reply.
    pub fn call<A, T>(&mut self, method: &str, args: &A) -> Result<T>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let seq = self.send_call(method, args)?;
        self.wait_unary(seq)
    }

    /// Call a streaming method and iterate over its replies.
    pub fn stream<A, T>(&mut self, method: &str, args: &A) -> Result<ReplyStream<'_, T, R, W>>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let seq = self.send_call(method, args)?;
        Ok(ReplyStream {
            client: self,
            seq,
            expected: 0,
            done: false,
            settled: false,
            _reply: PhantomData,
        })
    }
}

/// Replies of one streaming call.
///
/// Yields, in index order:
/// - `Ok(value)` for each data frame whose payload decodes as `T`;
/// - `Err(RpcError::TypeMismatch)` for a data frame that does not; iteration
///   continues, the caller decides whether to skip it or give up;
/// - `Err(RpcError::Remote)` once if the call failed, then ends;
/// - `Err(RpcError::Protocol)` on an index gap or reordering, then ends.
///
/// Ends with `None` after a successful terminal frame. Dropping the stream
/// before its terminal frame discards the rest of the call's replies.
pub struct ReplyStream<'c, T, R = RpcStream, W = RpcStream> {
    client: &'c mut Client<R, W>,
    seq: u64,
    expected: u64,
    done: bool,
    /// Terminal frame consumed, or the connection is gone.
    settled: bool,
    _reply: PhantomData<fn() -> T>,
}

impl<T, R, W> ReplyStream<'_, T, R, W> {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Data frames received so far, including mismatched ones.
    pub fn delivered(&self) -> u64 {
        self.expected
    }
}

impl<T, R, W> Drop for ReplyStream<'_, T, R, W> {
    fn drop(&mut self) {
        if !self.settled {
            self.client.abandon(self.seq);
        }
    }
}

impl<T: DeserializeOwned, R: Read, W: Write> Iterator for ReplyStream<'_, T, R, W> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        if self.done {
            return None;
        }

        let reply = match self.client.next_reply(self.seq) {
            Ok(reply) => reply,
            Err(err) => {
                self.done = true;
                self.settled = true;
                return Some(Err(err));
            }
        };

        if reply.index != self.expected {
            self.done = true;
            return Some(Err(RpcError::Protocol(format!(
                "call {} sent reply index {} where {} was expected",
                self.seq, reply.index, self.expected
            ))));
        }

        if reply.is_final {
            self.done = true;
            self.settled = true;
            if let Some(message) = reply.error {
                return Some(Err(RpcError::Remote {
                    message,
                    delivered: self.expected,
                }));
            }
            // A unary method called as a stream answers with one final value.
            return reply.payload.map(|payload| decode_payload(payload, reply.index));
        }

        self.expected += 1;
        match reply.payload {
            Some(payload) => Some(decode_payload(payload, reply.index)),
            None => {
                self.done = true;
                Some(Err(RpcError::Protocol(format!(
                    "call {} sent data frame {} without payload",
                    self.seq, reply.index
                ))))
            }
        }
    }
}

fn decode_payload<T: DeserializeOwned>(payload: Value, index: u64) -> Result<T> {
    serde_json::from_value(payload).map_err(|source| RpcError::TypeMismatch { index, source })
}
