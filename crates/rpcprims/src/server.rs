use std::net::SocketAddr;

use rpcprims_rpc::{Dispatcher, DispatcherConfig, RegistrationError, Registry};
use rpcprims_transport::{Gateway, ServerLifecycle, TransportError, DEFAULT_RPC_PATH};
use tracing::{debug, info, warn};

use crate::arith;

/// Default TCP port of the RPC server.
pub const DEFAULT_PORT: u16 = 9279;

/// Errors raised while starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("registration failed: {0}")]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    pub addr: String,
    /// Path the `CONNECT` endpoint is mounted on.
    pub rpc_path: String,
    pub dispatcher: DispatcherConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: format!("127.0.0.1:{DEFAULT_PORT}"),
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

/// A bound RPC server: HTTP gateway in front, dispatcher behind.
pub struct Server {
    gateway: Gateway,
    dispatcher: Dispatcher,
}

impl Server {
    /// Bind the listener and serve `registry` on it.
    pub async fn bind(
        config: &ServerConfig,
        registry: Registry,
        lifecycle: ServerLifecycle,
    ) -> Result<Self, ServerError> {
        for method in registry.descriptors() {
            debug!(
                method = method.name(),
                kind = %method.kind(),
                args = method.argument_shape(),
                reply = method.reply_shape(),
                "registered method"
            );
        }
        let gateway = Gateway::bind(&config.addr, lifecycle)
            .await?
            .with_rpc_path(config.rpc_path.clone());
        let dispatcher = Dispatcher::with_config(registry, config.dispatcher.clone());

        Ok(Self {
            gateway,
            dispatcher,
        })
    }

    /// Bind a server exposing the `Arith` service.
    pub async fn bind_arith(
        config: &ServerConfig,
        lifecycle: ServerLifecycle,
    ) -> Result<Self, ServerError> {
        Self::bind(config, arith::registry()?, lifecycle).await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.gateway.local_addr()
    }

    /// Serve until the lifecycle stops accepting and every live connection
    /// has ended, or until it terminates.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(
            addr = %self.gateway.local_addr(),
            methods = self.dispatcher.registry().len(),
            "rpc server running"
        );
        let dispatcher = self.dispatcher;
        self.gateway
            .serve(move |stream, peer, token| {
                let dispatcher = dispatcher.clone();
                async move {
                    debug!(%peer, "rpc session started");
                    match dispatcher.serve(stream, token).await {
                        Ok(()) => debug!(%peer, "rpc session closed"),
                        Err(err) => warn!(%peer, error = %err, "rpc session ended with error"),
                    }
                }
            })
            .await?;
        info!("rpc server stopped");
        Ok(())
    }
}
