use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected RPC byte stream, readable and writable.
///
/// This is the fundamental I/O type returned by blocking transport
/// operations. After [`crate::connect`] it carries raw frames, the HTTP
/// upgrade having already been consumed.
pub struct RpcStream {
    inner: TcpStream,
    peer: SocketAddr,
}

impl Read for RpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for RpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl RpcStream {
    /// Wrap a connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        Ok(Self {
            inner: stream,
            peer,
        })
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self {
            inner: cloned,
            peer: self.peer,
        })
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Close both directions of the connection.
    ///
    /// Every clone of this stream observes the close.
    pub fn close(&self) -> Result<()> {
        match self.inner.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for RpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcStream")
            .field("type", &"tcp")
            .field("peer", &self.peer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn wraps_tcp_stream_and_clones() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = std::thread::spawn(move || {
            let (mut server, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            server.read_exact(&mut buf).unwrap();
            server.write_all(&buf).unwrap();
        });

        let mut stream = RpcStream::from_tcp(TcpStream::connect(addr).unwrap()).unwrap();
        assert_eq!(stream.peer_addr(), addr);

        let mut reader = stream.try_clone().unwrap();
        stream.write_all(b"hello").unwrap();

        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        handle.join().unwrap();
        stream.close().unwrap();
    }

    #[test]
    fn timeouts_apply() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = RpcStream::from_tcp(TcpStream::connect(addr).unwrap()).unwrap();
        let _server = listener.accept().unwrap();

        stream
            .set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();
        stream
            .set_write_timeout(Some(Duration::from_millis(10)))
            .unwrap();

        let mut reader = stream.try_clone().unwrap();
        let mut buf = [0u8; 1];
        let err = reader.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ));
    }
}
