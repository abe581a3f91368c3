//! Frame kinds.
//!
//! Every frame on an upgraded RPC stream is either a call travelling from
//! client to server or a reply travelling back.

use std::fmt;

use crate::error::FrameError;

/// The 2-byte kind tag carried in every frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FrameKind {
    /// Call envelope (client → server).
    Call = 1,
    /// Reply frame (server → client).
    Reply = 2,
}

impl FrameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Call => "CALL",
            Self::Reply => "REPLY",
        }
    }
}

impl From<FrameKind> for u16 {
    fn from(kind: FrameKind) -> Self {
        kind as u16
    }
}

impl TryFrom<u16> for FrameKind {
    type Error = FrameError;

    fn try_from(raw: u16) -> Result<Self, FrameError> {
        match raw {
            1 => Ok(Self::Call),
            2 => Ok(Self::Reply),
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
