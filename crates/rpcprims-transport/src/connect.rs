//! Client side of the HTTP `CONNECT` upgrade.
//!
//! The server exposes the RPC endpoint behind a plain HTTP/1.1 listener. A
//! client sends `CONNECT <path>`, waits for a `200` status line, and from
//! then on the socket carries raw frames.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::stream::RpcStream;

/// Path the RPC endpoint is mounted on.
pub const DEFAULT_RPC_PATH: &str = "/_rpc_";

/// Reason phrase sent with the `200` status line of a successful upgrade.
pub const CONNECTED_REASON: &str = "Connected to Go RPC";

/// Upper bound on the upgrade response head.
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// Configuration for establishing an upgraded connection.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Request path of the RPC endpoint.
    pub path: String,
    /// Timeout for the TCP connect and for the upgrade exchange.
    pub timeout: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_RPC_PATH.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Connect to `addr` and upgrade to a raw RPC stream using defaults.
pub fn connect(addr: &str) -> Result<RpcStream> {
    connect_with_config(addr, &ConnectConfig::default())
}

/// Connect to `addr` and upgrade to a raw RPC stream.
pub fn connect_with_config(addr: &str, config: &ConnectConfig) -> Result<RpcStream> {
    let stream = open_tcp(addr, config.timeout)?;
    let mut stream = RpcStream::from_tcp(stream)?;

    stream.set_read_timeout(Some(config.timeout))?;
    stream.set_write_timeout(Some(config.timeout))?;
    request_upgrade(&mut stream, addr, &config.path)?;
    // Upgrade is bounded by the config timeout; the framed session is not.
    stream.set_read_timeout(None)?;
    stream.set_write_timeout(None)?;

    debug!(addr, path = %config.path, "upgraded connection to rpc stream");
    Ok(stream)
}

fn open_tcp(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let candidates = addr
        .to_socket_addrs()
        .map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })?;

    let mut last_err = std::io::Error::new(ErrorKind::NotFound, "address resolved to nothing");
    for candidate in candidates {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = err,
        }
    }

    Err(TransportError::Connect {
        addr: addr.to_string(),
        source: last_err,
    })
}

/// Send the `CONNECT` request and consume the response head.
///
/// Reads byte-by-byte so that nothing past the blank line is swallowed.
pub fn request_upgrade<S: Read + Write>(stream: &mut S, host: &str, path: &str) -> Result<()> {
    let request = format!("CONNECT {path} HTTP/1.1\r\nHost: {host}\r\n\r\n");
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let head = read_response_head(stream)?;
    let status_line = head
        .lines()
        .next()
        .map(str::trim_end)
        .ok_or_else(|| TransportError::MalformedResponse("empty response".to_string()))?;

    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(TransportError::MalformedResponse(status_line.to_string()));
    }
    if code != "200" {
        return Err(TransportError::UpgradeRejected(status_line.to_string()));
    }

    Ok(())
}

fn read_response_head<R: Read>(stream: &mut R) -> Result<String> {
    let mut head = Vec::with_capacity(128);
    let mut byte = [0u8; 1];

    loop {
        match stream.read(&mut byte) {
            Ok(0) => {
                return Err(TransportError::MalformedResponse(
                    "connection closed during upgrade".to_string(),
                ))
            }
            Ok(_) => head.push(byte[0]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }

        if head.ends_with(b"\r\n\r\n") || head.ends_with(b"\n\n") {
            break;
        }
        if head.len() > MAX_RESPONSE_HEAD {
            return Err(TransportError::MalformedResponse(format!(
                "response head exceeds {MAX_RESPONSE_HEAD} bytes"
            )));
        }
    }

    String::from_utf8(head)
        .map_err(|_| TransportError::MalformedResponse("response head is not utf-8".to_string()))
}
