//! Calls, unary and streamed replies over rpcprims frames.
//!
//! A [`Registry`] maps `Service.Method` names to typed handlers. The
//! [`Dispatcher`] serves a registry over any duplex byte stream: each incoming
//! [`CallEnvelope`] runs as its own task and answers with one or more
//! [`ReplyFrame`]s. Streaming handlers push values through a
//! [`ReplyEmitter`] that is only live while the handler runs.
//!
//! ```text
//! client                        server
//!   CALL  {seq:3, Arith.Thrive}  →
//!                              ←  REPLY {seq:3, index:0, payload}
//!                              ←  REPLY {seq:3, index:1, payload}
//!                              ←  REPLY {seq:3, index:2, final}
//! ```
//!
//! [`Client`] is the blocking counterpart used by tests and the CLI.

pub mod client;
pub mod dispatcher;
pub mod emitter;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod wire;

pub use client::{Client, ClientConfig, ReplyStream};
pub use dispatcher::{Dispatcher, DispatcherConfig, HANDLER_PANICKED};
pub use emitter::ReplyEmitter;
pub use envelope::{decode_call, decode_reply, encode_call, encode_reply, CallEnvelope, ReplyFrame};
pub use error::{CallError, RegistrationError, Result, RpcError};
pub use registry::{MethodDescriptor, MethodKind, Registry};
pub use wire::{CallWriter, ReplyReader};
