//! TCP transport and HTTP upgrade bootstrap for rpcprims.
//!
//! The RPC endpoint lives behind a plain HTTP/1.1 listener: clients send
//! `CONNECT`, receive a fixed `200` greeting, and then speak raw frames on
//! the same socket.
//!
//! - [`connect`]: blocking client side of the upgrade, yielding an [`RpcStream`]
//! - [`gateway`]: async server side: listener, upgrade, `/shutdown` (feature `async`)
//! - [`lifecycle`]: explicit server lifecycle object (feature `async`)

pub mod connect;
pub mod error;
pub mod stream;

#[cfg(feature = "async")]
pub mod gateway;
#[cfg(feature = "async")]
pub mod lifecycle;

pub use connect::{
    connect, connect_with_config, request_upgrade, ConnectConfig, CONNECTED_REASON,
    DEFAULT_RPC_PATH,
};
pub use error::{Result, TransportError};
pub use stream::RpcStream;

#[cfg(feature = "async")]
pub use gateway::{Gateway, SessionFuture, UpgradedStream, SHUTDOWN_PATH};
#[cfg(feature = "async")]
pub use lifecycle::ServerLifecycle;
