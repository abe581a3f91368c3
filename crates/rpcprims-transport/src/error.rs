/// Errors that can occur in RPC transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server refused to upgrade the connection to a raw RPC stream.
    #[error("upgrade rejected: {0}")]
    UpgradeRejected(String),

    /// The upgrade response could not be parsed.
    #[error("malformed upgrade response: {0}")]
    MalformedResponse(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
