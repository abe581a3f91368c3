/// Errors that can occur in rpc operations.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] rpcprims_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] rpcprims_frame::FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The peer broke the framing rules (wrong frame kind, index gap, ...).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The call failed on the server.
    ///
    /// `delivered` counts the stream replies received before the failure.
    #[error("remote error: {message}")]
    Remote { message: String, delivered: u64 },

    /// A reply arrived whose payload does not have the expected shape.
    #[error("reply {index} does not match the expected type: {source}")]
    TypeMismatch {
        index: u64,
        source: serde_json::Error,
    },

    /// A reply emitter was used after its call had returned.
    #[error("reply emitter used after the call returned")]
    EmitterClosed,

    /// The connection is gone.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, RpcError>;

/// Errors raised while populating a [`crate::Registry`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// A service or method name is not an exported identifier.
    #[error("invalid {part} name {name:?}: {reason}")]
    InvalidName {
        part: &'static str,
        name: String,
        reason: &'static str,
    },

    /// The same `Service.Method` was registered twice.
    #[error("method {0} already registered")]
    Duplicate(String),
}

/// Call-level failures. These travel to the caller as the terminal frame's
/// error text and never close the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// No method with this name is registered.
    #[error("method not found: {0}")]
    NotFound(String),

    /// The argument payload does not fit the method's argument type.
    #[error("invalid arguments for {method}: {reason}")]
    Decode { method: String, reason: String },

    /// The handler's reply could not be serialized.
    #[error("cannot encode reply of {method}: {reason}")]
    Encode { method: String, reason: String },

    /// The handler returned an error.
    #[error("{0}")]
    Application(String),
}
