//! HTTP bootstrap for the RPC endpoint.
//!
//! A plain HTTP/1.1 listener with two routes:
//! - the RPC path: `CONNECT` is answered with `200 Connected to Go RPC` and
//!   the upgraded byte stream is handed to the session handler; any other
//!   method gets `405`.
//! - `/shutdown`: stops accepting new connections.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::ext::ReasonPhrase;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::Upgraded;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::connect::{CONNECTED_REASON, DEFAULT_RPC_PATH};
use crate::error::{Result, TransportError};
use crate::lifecycle::ServerLifecycle;

/// Path of the shutdown control endpoint.
pub const SHUTDOWN_PATH: &str = "/shutdown";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Raw duplex stream obtained from a successful `CONNECT`.
pub type UpgradedStream = TokioIo<Upgraded>;

/// Future returned by a session handler.
pub type SessionFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

type SessionHandler =
    Arc<dyn Fn(UpgradedStream, SocketAddr, CancellationToken) -> SessionFuture + Send + Sync>;

/// HTTP listener that upgrades `CONNECT` requests into RPC sessions.
pub struct Gateway {
    listener: TcpListener,
    local_addr: SocketAddr,
    rpc_path: String,
    lifecycle: ServerLifecycle,
}

impl Gateway {
    /// Bind a TCP listener on `addr`.
    pub async fn bind(addr: &str, lifecycle: ServerLifecycle) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!(%local_addr, "listening for rpc connections");

        Ok(Self {
            listener,
            local_addr,
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            lifecycle,
        })
    }

    /// Override the path the RPC endpoint is mounted on.
    pub fn with_rpc_path(mut self, path: impl Into<String>) -> Self {
        self.rpc_path = path.into();
        self
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until the lifecycle stops accepting, then wait for
    /// live sessions to finish (or be terminated).
    ///
    /// `handler` runs once per upgraded connection. The token it receives is
    /// cancelled when the server terminates.
    pub async fn serve<H, Fut>(self, handler: H) -> Result<()>
    where
        H: Fn(UpgradedStream, SocketAddr, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: SessionHandler = Arc::new(
            move |stream: UpgradedStream, peer: SocketAddr, token: CancellationToken| {
                Box::pin(handler(stream, peer, token)) as SessionFuture
            },
        );
        let tracker = TaskTracker::new();
        let routes = Routes {
            rpc_path: Arc::from(self.rpc_path.as_str()),
            lifecycle: self.lifecycle.clone(),
            handler,
            tracker: tracker.clone(),
        };

        loop {
            tokio::select! {
                _ = self.lifecycle.accepting_stopped() => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!(error = %TransportError::Accept(err), "accept failed");
                            continue;
                        }
                    };
                    debug!(%peer, "accepted connection");
                    tracker.spawn(serve_http(stream, peer, routes.clone()));
                }
            }
        }

        drop(self.listener);
        tracker.close();
        info!(
            addr = %self.local_addr,
            live = tracker.len(),
            "stopped accepting connections"
        );

        tokio::select! {
            _ = tracker.wait() => {}
            _ = self.lifecycle.terminated() => {
                // Sessions observe their cancelled tokens and unwind.
                tracker.wait().await;
            }
        }

        Ok(())
    }
}

#[derive(Clone)]
struct Routes {
    rpc_path: Arc<str>,
    lifecycle: ServerLifecycle,
    handler: SessionHandler,
    tracker: TaskTracker,
}

impl Routes {
    fn route(&self, req: Request<Incoming>, peer: SocketAddr) -> Response<Full<Bytes>> {
        let path = req.uri().path();

        if path == &*self.rpc_path {
            if req.method() != Method::CONNECT {
                return text_response(StatusCode::METHOD_NOT_ALLOWED, "405 must CONNECT\n");
            }
            self.upgrade(req, peer);
            let mut resp = Response::new(Full::new(Bytes::new()));
            resp.extensions_mut()
                .insert(ReasonPhrase::from_static(CONNECTED_REASON.as_bytes()));
            return resp;
        }

        if path == SHUTDOWN_PATH {
            info!(%peer, "shutdown requested");
            self.lifecycle.stop_accepting();
            return text_response(StatusCode::OK, "shutting down");
        }

        text_response(StatusCode::NOT_FOUND, "404 page not found\n")
    }

    fn upgrade(&self, mut req: Request<Incoming>, peer: SocketAddr) {
        let handler = Arc::clone(&self.handler);
        let token = self.lifecycle.connection_token();

        self.tracker.spawn(async move {
            match hyper::upgrade::on(&mut req).await {
                Ok(upgraded) => {
                    debug!(%peer, "connection upgraded");
                    handler(TokioIo::new(upgraded), peer, token).await;
                }
                Err(err) => warn!(%peer, error = %err, "connection upgrade failed"),
            }
        });
    }
}

async fn serve_http(stream: TcpStream, peer: SocketAddr, routes: Routes) {
    let token = routes.lifecycle.connection_token();
    let service = service_fn(move |req| {
        let resp = routes.route(req, peer);
        async move { Ok::<_, Infallible>(resp) }
    });

    let conn = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades();

    tokio::select! {
        res = conn => {
            if let Err(err) = res {
                debug!(%peer, error = %err, "http connection ended with error");
            }
        }
        _ = token.cancelled() => debug!(%peer, "http connection cancelled"),
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    resp
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    async fn start_echo_gateway() -> (SocketAddr, ServerLifecycle, tokio::task::JoinHandle<()>) {
        let lifecycle = ServerLifecycle::new();
        let gateway = Gateway::bind("127.0.0.1:0", lifecycle.clone())
            .await
            .unwrap();
        let addr = gateway.local_addr();

        let handle = tokio::spawn(async move {
            gateway
                .serve(|mut stream, _peer, token| async move {
                    let mut buf = [0u8; 64];
                    loop {
                        let n = tokio::select! {
                            n = stream.read(&mut buf) => n.unwrap_or(0),
                            _ = token.cancelled() => 0,
                        };
                        if n == 0 || stream.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                })
                .await
                .unwrap();
        });

        (addr, lifecycle, handle)
    }

    async fn read_head(stream: &mut TcpStream) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            stream.read_exact(&mut byte).await.unwrap();
            head.push(byte[0]);
        }
        String::from_utf8(head).unwrap()
    }

    #[tokio::test]
    async fn connect_upgrades_to_raw_stream() {
        let (addr, lifecycle, handle) = start_echo_gateway().await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"CONNECT /_rpc_ HTTP/1.1\r\nHost: test\r\n\r\n")
            .await
            .unwrap();
        let head = read_head(&mut stream).await;
        assert!(head.starts_with("HTTP/1.1 200 Connected to Go RPC\r\n"));

        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        lifecycle.terminate();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn non_connect_is_method_not_allowed() {
        let (addr, lifecycle, handle) = start_echo_gateway().await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /_rpc_ HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut resp = String::new();
        stream.read_to_string(&mut resp).await.unwrap();

        assert!(resp.starts_with("HTTP/1.1 405"));
        assert!(resp.contains("text/plain; charset=utf-8"));
        assert!(resp.ends_with("405 must CONNECT\n"));

        lifecycle.terminate();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_stops_accepting_but_keeps_sessions() {
        let (addr, _lifecycle, handle) = start_echo_gateway().await;

        let mut session = TcpStream::connect(addr).await.unwrap();
        session
            .write_all(b"CONNECT /_rpc_ HTTP/1.1\r\nHost: test\r\n\r\n")
            .await
            .unwrap();
        read_head(&mut session).await;

        let mut control = TcpStream::connect(addr).await.unwrap();
        control
            .write_all(b"GET /shutdown HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut resp = String::new();
        control.read_to_string(&mut resp).await.unwrap();
        assert!(resp.ends_with("shutting down"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(TcpStream::connect(addr).await.is_err());

        session.write_all(b"still").await.unwrap();
        let mut buf = [0u8; 5];
        session.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"still");

        drop(session);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (addr, lifecycle, handle) = start_echo_gateway().await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /nope HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut resp = String::new();
        stream.read_to_string(&mut resp).await.unwrap();
        assert!(resp.starts_with("HTTP/1.1 404"));

        lifecycle.terminate();
        handle.await.unwrap();
    }
}
