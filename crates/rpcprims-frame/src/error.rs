/// Failures while turning bytes into frames or frames into bytes.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// First two header bytes were not `"RP"`; the stream is out of sync.
    #[error("invalid frame magic (expected 0x5250 \"RP\")")]
    InvalidMagic,

    /// The header names a frame kind this protocol does not define.
    #[error("unknown frame kind {0}")]
    UnknownKind(u16),

    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// EOF before a complete frame, or a zero-length write.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
