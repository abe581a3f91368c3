//! Arithmetic RPC server with unary and server-streamed replies.
//!
//! The server listens for HTTP/1.1, upgrades `CONNECT /_rpc_` requests into
//! raw framed streams and dispatches calls to the [`arith`] service. It is a
//! conformance target for clients: `Arith.Thrive` can fail mid-stream or slip
//! a wrongly typed frame into its replies on request.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP streams, the `CONNECT` upgrade, the HTTP gateway
//! - [`frame`]: length-prefixed call/reply framing
//! - [`rpc`]: registry, dispatcher, reply emitter, blocking client
//! - [`arith`]: the `Arith` service handlers
//! - [`server`]: gateway and dispatcher wired together

pub mod arith;
pub mod server;

/// Re-export transport types.
pub mod transport {
    pub use rpcprims_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rpcprims_frame::*;
}

/// Re-export rpc types.
pub mod rpc {
    pub use rpcprims_rpc::*;
}

pub use server::{Server, ServerConfig, ServerError, DEFAULT_PORT};
