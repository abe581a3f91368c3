use std::fmt;
use std::io;

use rpcprims::ServerError;
use rpcprims_frame::FrameError;
use rpcprims_rpc::RpcError;
use rpcprims_transport::TransportError;

// Process exit codes.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrInUse => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        FrameError::InvalidMagic | FrameError::UnknownKind(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
    }
}

pub fn rpc_error(context: &str, err: RpcError) -> CliError {
    match err {
        RpcError::Transport(err) => transport_error(context, err),
        RpcError::Frame(err) => frame_error(context, err),
        RpcError::Json(_) | RpcError::TypeMismatch { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        RpcError::Protocol(_) => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        RpcError::Remote { .. } | RpcError::ConnectionClosed => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        RpcError::EmitterClosed => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn server_error(context: &str, err: ServerError) -> CliError {
    match err {
        ServerError::Transport(err) => transport_error(context, err),
        ServerError::Registration(err) => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_are_plain_failures() {
        let err = rpc_error(
            "call failed",
            RpcError::Remote {
                message: "divide by zero".into(),
                delivered: 0,
            },
        );
        assert_eq!(err.code, FAILURE);
        assert_eq!(err.to_string(), "call failed: remote error: divide by zero");
    }

    #[test]
    fn io_kinds_map_to_codes() {
        let refused = rpc_error(
            "connect failed",
            RpcError::Transport(TransportError::Connect {
                addr: "127.0.0.1:1".into(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            }),
        );
        assert_eq!(refused.code, FAILURE);

        let timed_out = frame_error("read failed", FrameError::Io(io::ErrorKind::TimedOut.into()));
        assert_eq!(timed_out.code, TIMEOUT);

        let rejected = transport_error(
            "connect failed",
            TransportError::UpgradeRejected("HTTP/1.1 405".into()),
        );
        assert_eq!(rejected.code, TRANSPORT_ERROR);
    }

    #[test]
    fn out_of_sync_frames_are_transport_errors() {
        let magic = frame_error("read failed", FrameError::InvalidMagic);
        assert_eq!(magic.code, TRANSPORT_ERROR);

        let kind = frame_error("read failed", FrameError::UnknownKind(7));
        assert_eq!(kind.code, TRANSPORT_ERROR);
        assert_eq!(kind.to_string(), "read failed: unknown frame kind 7");
    }
}
