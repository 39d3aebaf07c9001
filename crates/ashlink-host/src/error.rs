use std::fmt;

use ashlink_transport::TransportError;

/// Host-detected conditions that end a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HostFault {
    /// The NCP answered the reset with an unsupported protocol version.
    #[error("NCP speaks ASH version {got}, expected {expected}")]
    Version { got: u8, expected: u8 },

    /// Too many consecutive acknowledgement timeouts.
    #[error("NCP stopped acknowledging frames")]
    Timeouts,

    /// No RSTACK arrived before the reset timer expired.
    #[error("NCP did not acknowledge the reset")]
    ResetFailed,

    /// The NCP reset itself while connected.
    #[error("NCP reset unexpectedly (reason 0x{reason:02X})")]
    NcpReset { reason: u8 },

    /// The serial line violated the configured flow control.
    #[error("serial flow control violation")]
    FlowControl,

    /// The serial port failed or was closed.
    #[error("serial port failure")]
    Serial,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The host gave up on the link.
    Host(HostFault),
    /// The NCP sent an ERROR frame with this code.
    Ncp(u8),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(fault) => write!(f, "{fault}"),
            Self::Ncp(code) => write!(f, "NCP reported error 0x{code:02X}"),
        }
    }
}

/// Errors returned by the host API.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The session is not connected.
    #[error("not connected")]
    NotConnected,

    /// The session ended; it stays down until the next reset.
    #[error("disconnected: {0}")]
    Disconnected(DisconnectReason),

    /// A payload is shorter than the minimum DATA field.
    #[error("payload too short ({len} bytes, min {min})")]
    DataTooShort { len: usize, min: usize },

    /// A payload is longer than the maximum DATA field.
    #[error("payload too long ({len} bytes, max {max})")]
    DataTooLong { len: usize, max: usize },

    /// Every transmit buffer is in use.
    #[error("no transmit buffer available")]
    NoTxSpace,

    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No configuration preset has this index.
    #[error("unknown configuration preset {index} (have {count})")]
    UnknownPreset { index: usize, count: usize },

    /// The serial port returned an error outside the protocol engines.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl HostError {
    /// Whether the error leaves the session unusable until a reset.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Disconnected(_) | Self::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, HostError>;
